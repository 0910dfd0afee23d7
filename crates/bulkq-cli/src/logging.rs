//! Logging setup for the bulkq binary
//!
//! Human-readable output goes to stderr so stdout carries only results.
//! `RUST_LOG` overrides the verbosity-derived filter. An optional daily
//! rolling JSON file captures the same events for bug reports.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: &[&str] = &[
    "bulkq",
    "bulkq_core",
    "bulkq_drivers",
    "bulkq_driver_mssql",
    "bulkq_driver_sqlite",
    "bulkq_query",
    "bulkq_settings",
];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for JSON log files; `None` disables file logging
    pub log_dir: Option<PathBuf>,
    /// Default filter used when `RUST_LOG` is unset
    pub default_filter: String,
    pub include_location: bool,
}

impl LoggingConfig {
    /// Console filter from the number of `-v` flags
    pub fn from_verbosity(verbose: u8, log_dir: Option<PathBuf>) -> Self {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            log_dir,
            default_filter: default_filter(level),
            include_location: verbose > 2,
        }
    }
}

fn default_filter(level: &str) -> String {
    let mut filter = String::from("warn");
    for krate in CRATES {
        filter.push_str(&format!(",{krate}={level}"));
    }
    filter
}

/// Default directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bulkq")
        .join("logs")
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_filter))
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.include_location)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_filter(env_filter())
        .boxed();
    let mut layers = vec![console_layer];

    let mut guard = None;
    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "bulkq.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter())
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = ?config.log_dir,
        filter = %config.default_filter,
        "logging initialized"
    );

    Ok(guard)
}
