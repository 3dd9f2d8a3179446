//! Logging configuration
//!
//! Console output plus an optional rolling file written in JSON.

use serde::{Deserialize, Serialize};
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_NAME: &str = "kstone-provider.log";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error; `RUST_LOG` wins when set
    pub level: String,
    /// Directory for rolling log files
    pub file_path: Option<String>,
    pub rotation: LogRotation,
    /// JSON console output
    pub json_format: bool,
}

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            rotation: LogRotation::Daily,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// The returned guard flushes the file writer on drop and must be kept
    /// alive for as long as logs should reach the file.
    pub fn init(&self) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let console_layer = if self.json_format {
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(io::stdout)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .with_writer(io::stdout)
                .boxed()
        };

        let (file_layer, guard) = match self.file_path {
            Some(ref path) => {
                let file_appender = match self.rotation {
                    LogRotation::Hourly => rolling::hourly(path, LOG_FILE_NAME),
                    LogRotation::Daily => rolling::daily(path, LOG_FILE_NAME),
                    LogRotation::Never => rolling::never(path, LOG_FILE_NAME),
                };
                let (writer, guard) = non_blocking(file_appender);

                let layer = fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_writer(writer);

                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!("Logging initialized - level: {}", self.level);

        Ok(guard)
    }

    /// Initialize from `RUST_LOG` and `KSTONE_LOG_PATH`
    pub fn init_from_env() -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>>
    {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file_path = std::env::var("KSTONE_LOG_PATH").ok();

        Self {
            level,
            file_path,
            ..Default::default()
        }
        .init()
    }
}

/// Log a cluster lifecycle step with context
#[macro_export]
macro_rules! log_cluster_operation {
    ($op:expr, $cluster:expr) => {
        tracing::info!(
            operation = $op,
            cluster = %$cluster.name(),
            namespace = %$cluster.namespace(),
            "Cluster operation"
        )
    };
    ($op:expr, $cluster:expr, $($key:ident = $value:expr),+) => {
        tracing::info!(
            operation = $op,
            cluster = %$cluster.name(),
            namespace = %$cluster.namespace(),
            $($key = $value),+,
            "Cluster operation"
        )
    };
}
