//! Store directory locking
//!
//! A cache directory belongs to exactly one live store. `FsBlobStore::open`
//! takes an advisory exclusive lock on the store root and holds it for the
//! lifetime of the store, so a second process (or a second store in the same
//! process) pointed at the same directory waits and then fails instead of
//! interleaving writes.
//!
//! - Bounded wait with a timeout
//! - Contention is logged
//! - Released on drop

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};
use thiserror::Error;

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock timeout after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Advisory lock on a store root directory.
///
/// The lock is released when this struct is dropped.
#[derive(Debug)]
pub struct StoreLock {
    lock_path: PathBuf,
    lock_file: File,
}

impl StoreLock {
    /// Lock file name
    pub const LOCK_FILENAME: &'static str = ".jscache.lock";

    /// Acquire the lock on `root`, waiting up to `timeout`.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn acquire(root: &Path, timeout: Duration) -> LockResult<Self> {
        fs::create_dir_all(root)?;

        let lock_path = root.join(Self::LOCK_FILENAME);
        let start = Instant::now();
        let poll_interval = Duration::from_millis(25);
        let mut warned = false;

        loop {
            match Self::try_acquire_exclusive(&lock_path) {
                Ok(file) => {
                    if warned {
                        info!(
                            "[store] lock acquired after {:.1}s contention: {}",
                            start.elapsed().as_secs_f64(),
                            lock_path.display()
                        );
                    }
                    return Ok(Self {
                        lock_path,
                        lock_file: file,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > Duration::from_millis(250) {
                        warn!(
                            "[store] lock contention on {}, waiting...",
                            lock_path.display()
                        );
                        warned = true;
                    }
                }
                Err(e) => return Err(LockError::Io(e)),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout(timeout));
            }

            std::thread::sleep(poll_interval);
        }
    }

    #[cfg(unix)]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(lock_path)?;

        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor is still owned by `self.lock_file`.
            unsafe {
                libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquire_basic() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("cache");

        let lock = StoreLock::acquire(&root, Duration::from_secs(1)).unwrap();

        assert!(lock.path().exists());
        assert!(lock.path().file_name().unwrap() == StoreLock::LOCK_FILENAME);
    }

    #[test]
    fn test_lock_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("cache");
        assert!(!root.exists());

        let _lock = StoreLock::acquire(&root, Duration::from_secs(1)).unwrap();

        assert!(root.exists());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("cache");

        {
            let _lock = StoreLock::acquire(&root, Duration::from_secs(1)).unwrap();
        }

        let _lock2 = StoreLock::acquire(&root, Duration::from_secs(1)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_lock_contention_times_out() {
        use std::sync::mpsc;
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("cache");
        let root2 = root.clone();

        let lock1 = StoreLock::acquire(&root, Duration::from_secs(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = StoreLock::acquire(&root2, Duration::from_millis(100));
            tx.send(matches!(result, Err(LockError::Timeout(_)))).unwrap();
        });

        assert!(rx.recv().unwrap(), "second acquisition should time out");

        handle.join().unwrap();
        drop(lock1);
    }
}
