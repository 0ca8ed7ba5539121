//! Logging initialization for the binary.
//!
//! Thin wrapper over the observability crate: JSONL to
//! `<base>/logs/dev.jsonl`, plus stderr when running interactively.

use observability::LogConfig;
use std::path::PathBuf;

const SERVICE_NAME: &str = "site-auth";

/// Initialize logging.
///
/// `level` is the default filter, overridden by `RUST_LOG`. `log_path`
/// replaces the default JSONL location.
pub fn init_logging(level: &str, log_path: Option<PathBuf>, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path,
        also_stderr,
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
