//! Configuration management for the site-auth binary.

use crate::mask::mask_secret;
use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, error};
use url::Url;

/// Environment variable holding the Supabase project URL.
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
/// Environment variable holding the public anonymous API key.
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
/// Environment variable holding the site origin used in redirect URLs.
pub const ENV_SITE_ORIGIN: &str = "SITE_ORIGIN";
/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "SITE_LOG_LEVEL";

const LEGACY_ENV_SUPABASE_URL: &str = "NUXT_PUBLIC_SUPABASE_URL";
const LEGACY_ENV_SUPABASE_ANON_KEY: &str = "NUXT_PUBLIC_SUPABASE_ANON_KEY";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default site origin for redirect targets.
pub const DEFAULT_SITE_ORIGIN: &str = "http://localhost:3000";

/// Required configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    SupabaseUrl,
    SupabaseAnonKey,
}

impl ConfigKey {
    /// Environment variable that supplies this key.
    pub fn env_name(&self) -> &'static str {
        match self {
            ConfigKey::SupabaseUrl => ENV_SUPABASE_URL,
            ConfigKey::SupabaseAnonKey => ENV_SUPABASE_ANON_KEY,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_name())
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default)]
    pub supabase_url: String,
    /// Supabase public anonymous key.
    #[serde(default)]
    pub supabase_anon_key: String,
    /// Origin of the website, used to build OAuth and confirmation redirects.
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_site_origin() -> String {
    DEFAULT_SITE_ORIGIN.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            site_origin: default_site_origin(),
        }
    }
}

impl Config {
    /// Load from `paths.config_file()` when present, then apply the environment.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Override values from an arbitrary variable lookup.
    ///
    /// Blank values are ignored. The `NUXT_PUBLIC_*` names are consulted when
    /// the primary variable is unset.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &str, legacy: Option<&str>| {
            lookup(primary)
                .and_then(non_empty)
                .or_else(|| legacy.and_then(&lookup).and_then(non_empty))
        };

        if let Some(url) = read(ENV_SUPABASE_URL, Some(LEGACY_ENV_SUPABASE_URL)) {
            self.supabase_url = url;
        }
        if let Some(key) = read(ENV_SUPABASE_ANON_KEY, Some(LEGACY_ENV_SUPABASE_ANON_KEY)) {
            self.supabase_anon_key = key;
        }
        if let Some(origin) = read(ENV_SITE_ORIGIN, None) {
            self.site_origin = origin;
        }
        if let Some(level) = read(ENV_LOG_LEVEL, None) {
            self.log_level = level;
        }
    }

    /// Required keys that are empty.
    pub fn missing_keys(&self) -> Vec<ConfigKey> {
        let mut missing = Vec::new();
        if self.supabase_url.trim().is_empty() {
            missing.push(ConfigKey::SupabaseUrl);
        }
        if self.supabase_anon_key.trim().is_empty() {
            missing.push(ConfigKey::SupabaseAnonKey);
        }
        missing
    }

    /// Log the validation outcome. Never fails; returns whether the config is usable.
    ///
    /// Missing values are reported at error level. Present values are
    /// logged masked at debug level.
    pub fn report(&self) -> bool {
        let missing = self.missing_keys();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(ConfigKey::env_name).collect();
            error!(missing = ?names, "Missing Supabase configuration");
            return false;
        }

        debug!(
            supabase_url = %mask_secret(Some(&self.supabase_url)),
            anon_key = %mask_secret(Some(&self.supabase_anon_key)),
            "Supabase configuration loaded"
        );
        true
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> ConfigResult<Url> {
        Url::parse(self.supabase_url.trim()).map_err(ConfigError::from)
    }

    /// Site origin without a trailing slash.
    pub fn site_origin(&self) -> ConfigResult<String> {
        let origin = self.site_origin.trim().trim_end_matches('/');
        let parsed = Url::parse(origin)?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "site origin is not an http(s) origin: {}",
                origin
            )));
        }
        Ok(origin.to_string())
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
