//! File-backed subscriber.
//!
//! Appends JSONL lines to a single log file. When the file cannot be opened
//! the subscriber falls back to stderr only.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default log file: `~/.site-auth/logs/dev.jsonl`.
fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".site-auth")
        .join("logs")
        .join("dev.jsonl")
}

/// Append-only writer flushed after every line.
#[derive(Clone)]
pub struct LogFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

#[derive(Clone)]
pub struct WriterFactory {
    writer: LogFileWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the JSONL file layer plus the optional stderr layer.
pub fn init_file_subscriber(config: &LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let (json_layer, open_error) = match LogFileWriter::new(&log_path) {
        Ok(writer) => (
            Some(JsonLayer::new(
                config.service_name.clone(),
                WriterFactory { writer },
            )),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    // Without a file there is nowhere else to log, so stderr is forced on.
    let stderr_enabled = config.also_stderr || json_layer.is_none();
    let stderr_layer = stderr_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_ansi(true)
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter(&config.default_level))))
        .with(stderr_layer.map(|l| l.with_filter(env_filter(&config.default_level))))
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match open_error {
        None => tracing::info!(log_path = %log_path.display(), "observability initialized"),
        Some(e) => tracing::warn!(
            log_path = %log_path.display(),
            error = %e,
            "log file unavailable, logging to stderr only"
        ),
    }
}
