//! File system locations used by the binary.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".site-auth";

/// Manages file system paths under the base directory (`~/.site-auth`).
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.site-auth`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Paths rooted at a custom directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// `<base>/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// `<base>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `<base>/logs/dev.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }
}
