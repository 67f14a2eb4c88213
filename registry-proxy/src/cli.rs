//! Command-line interface for the registry proxy
//!
//! Flags are the last configuration layer: defaults, then the JSON file, then
//! the environment, then whatever is given here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{Config, Profile};
use crate::routes::RouteTable;
use crate::server;

#[derive(Parser)]
#[command(name = "registry-proxy")]
#[command(about = "Host-based reverse proxy for container registries")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON configuration file (skipped if missing)
    #[arg(long, short = 'c', global = true, default_value = "registry-proxy.json")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(long, short = 'p')]
        port: Option<u16>,
        /// Base domain for the built-in virtual hosts
        #[arg(long)]
        domain: Option<String>,
        /// Deployment profile: production, staging or debug
        #[arg(long)]
        mode: Option<Profile>,
    },
    /// Print the resolved route table
    Routes {
        /// Base domain for the built-in virtual hosts
        #[arg(long)]
        domain: Option<String>,
    },
}

/// Resolve configuration from file and environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env().context("Invalid configuration in environment")?;
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Start {
            host,
            port,
            domain,
            mode,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(domain) = domain {
                config.proxy.custom_domain = domain;
            }
            if let Some(mode) = mode {
                config.proxy.profile = mode;
            }
            config.validate().context("Invalid configuration")?;

            info!(config = %cli.config.display(), "Configuration resolved");
            server::run_server(config).await
        }
        Commands::Routes { domain } => {
            if let Some(domain) = domain {
                config.proxy.custom_domain = domain;
            }
            config.validate().context("Invalid configuration")?;

            let routes = RouteTable::from_config(&config.proxy)?;
            for (host, upstream) in routes.summary() {
                println!("{host:<40} {upstream}");
            }
            Ok(())
        }
    }
}
