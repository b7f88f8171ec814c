//! Configuration merge system
//!
//! Three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (`--config`, or ~/.config/jscache/config.toml if present)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

use std::env;
use std::path::PathBuf;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers, prune_nulls};
pub use settings::{CacheSettings, CompileSettings, HttpSettings, MAX_COMPILE_WORKERS};

use crate::timeout::TimeoutValidationError;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<TimeoutValidationError> for ConfigError {
    fn from(e: TimeoutValidationError) -> Self {
        Self::Invalid(e.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// The user config file location, whether or not it exists.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join("jscache").join("config.toml"));
    }
    env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join("jscache").join("config.toml"))
}
