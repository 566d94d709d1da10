//! # Observability
//!
//! Centralized logging setup for the chatsync workspace.
//!
//! ## Design Philosophy
//!
//! Crates are **log producers**. Library crates only call `tracing` macros;
//! binaries call `observability::init()` once at startup. Libraries have zero
//! knowledge of where logs go or who reads them.
//!
//! Two sinks are available:
//!
//! - a compact human-readable stream on stderr
//! - an optional structured JSONL file (one entry per line, append-only), so
//!   `tail -f ~/.chatsync/logs/chatsync.jsonl | jq` works across processes
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("chatsync");
//!     tracing::info!("service started");
//! }
//! ```
//!
//! Or with configuration:
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "chatsync".into(),
//!     default_level: "debug".into(),
//!     jsonl: true,
//!     ..Default::default()
//! });
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;

pub use file::{default_log_path, CentralLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "chatsync").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Write structured JSONL entries in addition to stderr.
    pub jsonl: bool,

    /// Optional custom JSONL path.
    /// Defaults to `~/.chatsync/logs/chatsync.jsonl`.
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            jsonl: false,
            log_path: None,
        }
    }
}

/// Initialize the logging layer with default settings.
///
/// Services call this once at startup:
///
/// ```rust,ignore
/// observability::init("my-service");
/// tracing::info!("ready");
/// ```
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the logging layer with custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// installed subscriber in place.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let (json_layer, json_error) = if config.jsonl {
        match file::json_layer(&config) {
            Ok(layer) => (Some(layer.with_filter(env_filter())), None),
            Err(err) => (None, Some(err)),
        }
    } else {
        (None, None)
    };

    if tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    if let Some(err) = json_error {
        tracing::warn!(error = %err, "JSONL log file unavailable, logging to stderr only");
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
