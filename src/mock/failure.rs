//! Failure Injection for Mock Capabilities
//!
//! Supports configurable failure injection for testing error paths.

use std::collections::HashMap;
use std::time::Duration;

use crate::http::NetworkError;

/// Failure configuration for a URL
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Transport error to return (if any)
    pub error: Option<NetworkError>,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that returns a transport error
    pub fn error(error: NetworkError) -> Self {
        Self {
            error: Some(error),
            delay: None,
            fail_count: None,
        }
    }

    /// Create a config that just adds delay
    pub fn delay(duration: Duration) -> Self {
        Self {
            error: None,
            delay: Some(duration),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Per-URL failure injector
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<String, FailureConfig>,
    /// Call counts per URL (for fail_count tracking)
    call_counts: HashMap<String, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for a URL
    pub fn inject(&mut self, url: impl Into<String>, config: FailureConfig) {
        let url = url.into();
        self.call_counts.insert(url.clone(), 0);
        self.configs.insert(url, config);
    }

    /// Inject a transport error for a URL
    pub fn inject_error(&mut self, url: impl Into<String>, error: NetworkError) {
        self.inject(url, FailureConfig::error(error));
    }

    /// Inject a delay for a URL
    pub fn inject_delay(&mut self, url: impl Into<String>, delay: Duration) {
        self.inject(url, FailureConfig::delay(delay));
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Clear failure injection for one URL
    pub fn clear_url(&mut self, url: &str) {
        self.configs.remove(url);
        self.call_counts.remove(url);
    }

    /// Check if a failure should occur for a URL
    /// Returns the failure config if one should occur, None otherwise
    pub fn check(&mut self, url: &str) -> Option<&FailureConfig> {
        let config = self.configs.get(url)?;
        let count = self.call_counts.entry(url.to_string()).or_insert(0);
        *count += 1;

        // Past the fail count the URL behaves normally
        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }

        Some(config)
    }
}
