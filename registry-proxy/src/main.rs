use anyhow::Result;
use clap::Parser;
use registry_proxy::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Held for the process lifetime so buffered file logs are flushed on exit.
    let _log_guard = registry_proxy_logging::init_from_env()?;

    cli::run(Cli::parse()).await
}
