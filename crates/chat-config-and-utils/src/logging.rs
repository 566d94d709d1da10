//! Logging initialization.
//!
//! Thin wrapper over the observability package so binaries share one service
//! name and one JSONL location.

use crate::Paths;

/// Service name written into every JSONL entry.
const SERVICE_NAME: &str = "chatsync";

/// Initialize logging.
///
/// - compact stderr output
/// - JSONL entries appended to `paths.log_file()` when `paths` is given
/// - level from `RUST_LOG`, falling back to `level`
///
/// ```ignore
/// init_logging("info", Some(&paths));
/// tracing::info!("chatsync started");
/// ```
pub fn init_logging(level: &str, paths: Option<&Paths>) {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        jsonl: paths.is_some(),
        log_path: paths.map(Paths::log_file),
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
