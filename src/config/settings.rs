//! Typed settings
//!
//! The merged configuration value is deserialized into [`CacheSettings`]
//! and validated before anything is opened.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::BuiltinDefaults;
use super::{ConfigError, ConfigResult};
use crate::index::IndexLimits;
use crate::resolver::ResolverOptions;
use crate::timeout::TimeoutConfig;

/// Upper bound on compile worker threads.
pub const MAX_COMPILE_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileSettings {
    pub workers: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    pub user_agent: String,
    pub max_body_bytes: u64,
    pub revalidate_with_validators: bool,
}

/// Everything needed to open a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub cache_dir: PathBuf,
    pub max_entries: usize,
    pub max_bytes: u64,
    pub default_ttl_ms: u64,
    pub fetch_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    pub compile: CompileSettings,
    pub http: HttpSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let d = BuiltinDefaults::default();
        Self {
            cache_dir: d.cache_dir,
            max_entries: d.max_entries,
            max_bytes: d.max_bytes,
            default_ttl_ms: d.default_ttl_ms,
            fetch_timeout_ms: d.fetch_timeout_ms,
            lock_timeout_ms: d.lock_timeout_ms,
            compile: CompileSettings {
                workers: d.compile_workers,
                queue_capacity: d.compile_queue_capacity,
            },
            http: HttpSettings {
                user_agent: d.user_agent,
                max_body_bytes: d.max_body_bytes,
                revalidate_with_validators: d.revalidate_with_validators,
            },
        }
    }
}

impl CacheSettings {
    /// Deserialize a merged configuration value and validate it.
    pub fn from_value(value: &Value) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid("max_entries must be at least 1".to_string()));
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid("max_bytes must be at least 1".to_string()));
        }
        self.timeouts().validate()?;
        if self.compile.workers == 0 || self.compile.workers > MAX_COMPILE_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "compile.workers must be in [1, {}], got {}",
                MAX_COMPILE_WORKERS, self.compile.workers
            )));
        }
        if self.compile.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "compile.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("http.user_agent must not be empty".to_string()));
        }
        if self.http.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "http.max_body_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn index_limits(&self) -> IndexLimits {
        IndexLimits::new(self.max_entries, self.max_bytes)
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::from_config(Some(self.fetch_timeout_ms), Some(self.lock_timeout_ms))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            default_ttl: self.default_ttl(),
            fetch_timeout: self.timeouts().fetch_timeout(),
            compile_workers: self.compile.workers,
            compile_queue_capacity: self.compile.queue_capacity,
            revalidate_with_validators: self.http.revalidate_with_validators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_value() {
        let value = BuiltinDefaults::default().to_value();
        let settings = CacheSettings::from_value(&value).unwrap();
        assert_eq!(settings, CacheSettings::default());
        assert_eq!(settings.index_limits(), IndexLimits::default());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut settings = CacheSettings::default();
        settings.compile.workers = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("compile.workers"));
    }

    #[test]
    fn test_timeout_bounds_enforced() {
        let mut settings = CacheSettings::default();
        settings.fetch_timeout_ms = 0;
        assert!(settings.validate().unwrap_err().to_string().contains("fetch_timeout_ms"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut value = BuiltinDefaults::default().to_value();
        value["max_entries"] = serde_json::json!("lots");
        assert!(matches!(
            CacheSettings::from_value(&value),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_resolver_options() {
        let mut settings = CacheSettings::default();
        settings.http.revalidate_with_validators = true;
        settings.fetch_timeout_ms = 1_234;

        let options = settings.resolver_options();
        assert!(options.revalidate_with_validators);
        assert_eq!(options.fetch_timeout, Duration::from_millis(1_234));
        assert_eq!(options.default_ttl, Duration::from_secs(86_400));
    }
}
