//! # Observability
//!
//! Logging setup shared by every site-auth crate.
//!
//! Library crates only emit `tracing` events. The binary calls
//! [`init_with_config`] once at startup and decides where those events go:
//!
//! - a JSONL file (`~/.site-auth/logs/dev.jsonl` unless overridden), one
//!   object per line, appended and flushed per write
//! - optionally a compact human-readable stream on stderr
//!
//! Both sinks honour `RUST_LOG` and fall back to the configured level.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "site-auth".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

#[cfg(feature = "file")]
mod dev;

mod json_layer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Custom log file path. Defaults to `~/.site-auth/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "file")]
    {
        dev::init_file_subscriber(&config);
    }

    #[cfg(not(feature = "file"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .compact()
            .finish()
            .try_init();
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;
