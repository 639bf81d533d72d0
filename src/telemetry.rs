//! Tracing setup for the monitor process
//!
//! [`init_tracing`] installs the global subscriber and returns a
//! [`TelemetryGuard`]; buffered log lines are flushed when the guard drops, so
//! the binary keeps it alive until it exits.

use crate::config::MonitorConfig;
use thiserror::Error;
use tracing::{info_span, Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryConfig {
    /// Default to DEBUG instead of INFO when `RUST_LOG` is unset
    pub verbose: bool,
    /// Emit JSON lines instead of human readable text
    pub json: bool,
}

/// Keeps the non-blocking writer alive; dropping it flushes pending lines
#[must_use = "dropping the guard stops log output"]
pub struct TelemetryGuard {
    _worker: WorkerGuard,
}

pub fn init_tracing(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let (writer, worker) = tracing_appender::non_blocking(std::io::stdout());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(TelemetryGuard { _worker: worker })
}

/// Span that scopes every event of one monitor run
pub fn monitor_span(config: &MonitorConfig) -> Span {
    info_span!(
        "congestion_monitor",
        interface = %config.interface,
        target = %config.target,
        threshold_ms = config.threshold_ms
    )
}
