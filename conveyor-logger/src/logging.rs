use std::{fs::File, sync::Arc};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Output format for log lines.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    Json,
    #[default]
    Plain,
}

/// Destination for log output.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

/// Logging configuration for a conveyor host process.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    /// Filter directives, e.g. `"info"` or `"info,conveyor_server=debug"`.
    /// A `RUST_LOG` environment variable takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    /// Path to the log file, required if output is `file`.
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LogConfig {
    /// Loads the configuration from a TOML file, letting `CONVEYOR__`-prefixed
    /// environment variables override individual fields.
    pub fn load(path: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CONVEYOR").separator("__"))
            .build()
            .context(format!("Failed to build log configuration from '{}'", path))?
            .try_deserialize()
            .context("Failed to deserialize log configuration")
    }
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// May only be called once per process; a second call fails inside
/// `tracing-subscriber` because the global default is already set.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context(format!("Invalid log filter '{}'", config.level))?;
    let subscriber = Registry::default().with(filter);

    match config.output {
        LogOutput::File => {
            let file_path = config.file_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("Log output is 'file' but 'file-path' is not specified")
            })?;
            let log_file = Arc::new(File::create(file_path)?);
            match config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().with_writer(log_file).json())
                    .init(),
                LogFormat::Plain => subscriber
                    .with(fmt::layer().with_writer(log_file).pretty())
                    .init(),
            }
        }
        LogOutput::Stdout => match config.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).json())
                .init(),
            LogFormat::Plain => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).pretty())
                .init(),
        },
    };

    tracing::debug!(level = %config.level, "logging initialized");
    Ok(())
}
