//! Process-wide tracing setup for the registry proxy.
//!
//! Everything is driven by environment variables so the same binary can log
//! human-readable output on a workstation and JSON lines behind a collector:
//!
//! - `LOG_LEVEL`: default filter directive (`info`), overridden by `RUST_LOG`
//! - `LOG_FORMAT`: `human` or `json`
//! - `LOG_OUTPUT`: `console`, `file` or `both`
//! - `LOG_FILE_PATH`: file target, rotated daily (`/tmp/registry-proxy.log`)

use std::env;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        writer::{BoxMakeWriter, MakeWriterExt},
    },
    layer::Layered,
    prelude::*,
    registry::Registry,
    util::TryInitError,
    EnvFilter, Layer,
};

const DEFAULT_LOG_FILE: &str = "/tmp/registry-proxy.log";

/// Noisy dependencies that are capped regardless of `LOG_LEVEL`.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"];

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Human
        }
    }
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "file" => Self::File,
            "both" => Self::Both,
            _ => Self::Console,
        }
    }

    fn uses_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            output: LogOutput::Console,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LoggingConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup, unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            level: lookup("LOG_LEVEL").unwrap_or(defaults.level),
            format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            output: lookup("LOG_OUTPUT")
                .map(|v| LogOutput::parse(&v))
                .unwrap_or(defaults.output),
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in QUIET_TARGETS {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }

    fn file_parts(&self) -> (PathBuf, PathBuf) {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("/tmp"))
            .to_path_buf();
        let name = self
            .file_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("registry-proxy.log"));
        (dir, name)
    }
}

/// Install the global subscriber described by `config`.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the process when file output is enabled.
pub fn init_subscriber(config: &LoggingConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let mut guard = None;

    let writer = if config.output.uses_file() {
        let (dir, name) = config.file_parts();
        let appender = tracing_appender::rolling::daily(dir, name);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        if config.output == LogOutput::Both {
            BoxMakeWriter::new(non_blocking.and(std::io::stdout))
        } else {
            BoxMakeWriter::new(non_blocking)
        }
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let fmt_layer: BoxedLayer = match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Human => fmt::layer().with_target(true).with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(guard)
}

/// Convenience wrapper: read the environment and install the subscriber.
pub fn init_from_env() -> Result<Option<WorkerGuard>, TryInitError> {
    init_subscriber(&LoggingConfig::from_env())
}
