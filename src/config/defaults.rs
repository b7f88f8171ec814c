//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compile::{DEFAULT_COMPILE_WORKERS, DEFAULT_QUEUE_CAPACITY};
use crate::entry::DEFAULT_TTL;
use crate::http::{DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT};
use crate::index::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES};
use crate::timeout::TimeoutConfig;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Cache directory (default: $XDG_CACHE_HOME/jscache, else ~/.cache/jscache)
    pub cache_dir: PathBuf,

    /// Maximum cached entries (default: 100)
    pub max_entries: usize,

    /// Byte budget for source plus bytecode (default: 50 MiB)
    pub max_bytes: u64,

    /// Validity window for fetched entries (default: 24h)
    pub default_ttl_ms: u64,

    /// Fetch deadline (default: 30 000)
    pub fetch_timeout_ms: u64,

    /// Wait for the cache directory lock (default: 5 000)
    pub lock_timeout_ms: u64,

    /// Background compile threads (default: 1)
    pub compile_workers: usize,

    /// Queued compile jobs before new ones are dropped (default: 64)
    pub compile_queue_capacity: usize,

    /// Send conditional requests for expired entries (default: false)
    pub revalidate_with_validators: bool,

    /// User-Agent sent with every fetch
    pub user_agent: String,

    /// Largest accepted response body (default: 16 MiB)
    pub max_body_bytes: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        let timeouts = TimeoutConfig::default();
        Self {
            cache_dir: default_cache_dir(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            default_ttl_ms: DEFAULT_TTL.as_millis() as u64,
            fetch_timeout_ms: timeouts.fetch_timeout_ms,
            lock_timeout_ms: timeouts.lock_timeout_ms,
            compile_workers: DEFAULT_COMPILE_WORKERS,
            compile_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            revalidate_with_validators: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "cache_dir": self.cache_dir,
            "max_entries": self.max_entries,
            "max_bytes": self.max_bytes,
            "default_ttl_ms": self.default_ttl_ms,
            "fetch_timeout_ms": self.fetch_timeout_ms,
            "lock_timeout_ms": self.lock_timeout_ms,
            "compile": {
                "workers": self.compile_workers,
                "queue_capacity": self.compile_queue_capacity
            },
            "http": {
                "user_agent": self.user_agent,
                "max_body_bytes": self.max_body_bytes,
                "revalidate_with_validators": self.revalidate_with_validators
            }
        })
    }
}

fn default_cache_dir() -> PathBuf {
    if let Some(xdg) = env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("jscache");
    }
    match env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home).join(".cache").join("jscache"),
        None => PathBuf::from(".cache").join("jscache"),
    }
}
