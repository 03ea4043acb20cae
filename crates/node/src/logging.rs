//! Logging Configuration
//!
//! This module provides structured logging configuration for the sync node.

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt,
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,

    /// Log format: "json" or "pretty"
    #[serde(default = "default_format")]
    pub format: LogFormat,

    /// Log outputs
    #[serde(default = "default_outputs")]
    pub outputs: Vec<LogOutput>,

    /// Log directory (required if outputs contains File)
    #[serde(default)]
    pub file_path: Option<String>,

    /// Rolled daily as `{file_name}.YYYY-MM-DD`
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_level() -> String { "info".to_string() }
fn default_format() -> LogFormat { LogFormat::Pretty }
fn default_outputs() -> Vec<LogOutput> { vec![LogOutput::Stdout] }
fn default_file_name() -> String { "chainsync.log".to_string() }

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File,
}

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

impl LoggingConfig {
    /// Create a new logging config with defaults
    pub fn new() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            outputs: default_outputs(),
            file_path: None,
            file_name: default_file_name(),
        }
    }

    /// Initialize the logging system
    ///
    /// Returns a WorkerGuard that must be kept alive for the duration of the program
    pub fn init(&self) -> Result<Option<WorkerGuard>, anyhow::Error> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| anyhow::anyhow!("Invalid log level {}: {}", self.level, e))?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.outputs.contains(&LogOutput::Stdout) {
            layers.push(match self.format {
                LogFormat::Json => fmt::layer().json().boxed(),
                LogFormat::Pretty => fmt::layer().pretty().boxed(),
            });
        }

        if self.outputs.contains(&LogOutput::File) {
            let file_path = self.file_path.as_ref()
                .ok_or_else(|| anyhow::anyhow!("File output requires file_path"))?;

            let file_appender = tracing_appender::rolling::daily(file_path, &self.file_name);
            let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);

            layers.push(match self.format {
                LogFormat::Json => fmt::layer().json().with_writer(non_blocking).boxed(),
                LogFormat::Pretty => fmt::layer().with_ansi(false).with_writer(non_blocking).boxed(),
            });
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layers)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set subscriber: {}", e))?;

        Ok(guard)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new()
    }
}
