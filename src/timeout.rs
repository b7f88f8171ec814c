//! Deadline enforcement for blocking work
//!
//! Network fetches run on a helper thread while the caller waits with a
//! deadline. When the deadline passes the caller gets
//! [`DeadlineError::Elapsed`] and moves on; the helper finishes in the
//! background and its late result is dropped, so nothing that arrives after
//! the deadline ever reaches the cache.
//!
//! - `fetch_timeout_ms`: maximum wall-clock time per fetch
//! - `lock_timeout_ms`: maximum wait for the cache directory lock

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::debug;

/// Longest accepted fetch timeout (10 minutes).
pub const MAX_FETCH_TIMEOUT_MS: u64 = 600_000;

/// Longest accepted lock wait (5 minutes).
pub const MAX_LOCK_TIMEOUT_MS: u64 = 300_000;

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum wall-clock time per fetch (default: 30 000)
    pub fetch_timeout_ms: u64,

    /// Maximum wait for the store lock (default: 5 000)
    pub lock_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 30_000,
            lock_timeout_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    /// Validate timeout bounds
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        if self.fetch_timeout_ms == 0 || self.fetch_timeout_ms > MAX_FETCH_TIMEOUT_MS {
            return Err(TimeoutValidationError::FetchOutOfBounds {
                value: self.fetch_timeout_ms,
            });
        }

        if self.lock_timeout_ms == 0 || self.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS {
            return Err(TimeoutValidationError::LockOutOfBounds {
                value: self.lock_timeout_ms,
            });
        }

        Ok(())
    }

    /// Create TimeoutConfig from effective config values
    pub fn from_config(fetch: Option<u64>, lock: Option<u64>) -> Self {
        let defaults = Self::default();
        Self {
            fetch_timeout_ms: fetch.unwrap_or(defaults.fetch_timeout_ms),
            lock_timeout_ms: lock.unwrap_or(defaults.lock_timeout_ms),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("fetch_timeout_ms must be in (0, 600000], got {value}")]
    FetchOutOfBounds { value: u64 },

    #[error("lock_timeout_ms must be in (0, 300000], got {value}")]
    LockOutOfBounds { value: u64 },
}

/// Why [`run_with_deadline`] returned without a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeadlineError {
    #[error("deadline of {0:?} elapsed")]
    Elapsed(Duration),

    #[error("failed to spawn helper thread: {0}")]
    Spawn(String),

    #[error("helper thread exited without a result")]
    Panicked,
}

/// Run `work` on a helper thread and wait at most `deadline` for it.
///
/// The helper is never joined. If it outlives the deadline its result is
/// discarded when the send to the departed caller fails.
pub fn run_with_deadline<T, F>(name: &str, deadline: Duration, work: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let label = name.to_string();

    thread::Builder::new()
        .name(format!("jscache-{}", name))
        .spawn(move || {
            let value = work();
            if tx.send(value).is_err() {
                debug!("[timeout] late {} result discarded", label);
            }
        })
        .map_err(|e| DeadlineError::Spawn(e.to_string()))?;

    match rx.recv_timeout(deadline) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(DeadlineError::Elapsed(deadline)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(DeadlineError::Panicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::sleep;

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.fetch_timeout_ms, 30_000);
        assert_eq!(config.lock_timeout_ms, 5_000);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_config_validation_valid() {
        assert!(TimeoutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_timeout_config_validation_fetch_zero() {
        let config = TimeoutConfig {
            fetch_timeout_ms: 0,
            lock_timeout_ms: 5_000,
        };
        assert!(matches!(
            config.validate(),
            Err(TimeoutValidationError::FetchOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_timeout_config_validation_fetch_too_large() {
        let config = TimeoutConfig {
            fetch_timeout_ms: MAX_FETCH_TIMEOUT_MS + 1,
            lock_timeout_ms: 5_000,
        };
        assert!(matches!(
            config.validate(),
            Err(TimeoutValidationError::FetchOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_timeout_config_validation_lock_zero() {
        let config = TimeoutConfig {
            fetch_timeout_ms: 1_000,
            lock_timeout_ms: 0,
        };
        assert!(matches!(
            config.validate(),
            Err(TimeoutValidationError::LockOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_from_config() {
        let config = TimeoutConfig::from_config(Some(1_500), None);
        assert_eq!(config.fetch_timeout_ms, 1_500);
        assert_eq!(config.lock_timeout_ms, 5_000);
    }

    #[test]
    fn test_deadline_met() {
        let value = run_with_deadline("test", Duration::from_secs(5), || 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_deadline_elapsed_discards_late_result() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let result = run_with_deadline("test", Duration::from_millis(50), move || {
            sleep(Duration::from_millis(300));
            flag.store(true, Ordering::SeqCst);
            "late"
        });

        assert_eq!(result, Err(DeadlineError::Elapsed(Duration::from_millis(50))));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_work_reports_panicked() {
        let result: Result<(), _> = run_with_deadline("test", Duration::from_secs(5), || {
            panic!("boom");
        });
        assert_eq!(result, Err(DeadlineError::Panicked));
    }
}
