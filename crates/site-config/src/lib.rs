//! Configuration, paths and logging setup for the site-auth binary.

mod config;
mod error;
mod logging;
mod mask;
mod paths;

pub use config::{
    Config, ConfigKey, DEFAULT_LOG_LEVEL, DEFAULT_SITE_ORIGIN, ENV_LOG_LEVEL, ENV_SITE_ORIGIN,
    ENV_SUPABASE_ANON_KEY, ENV_SUPABASE_URL,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use mask::mask_secret;
pub use paths::Paths;
