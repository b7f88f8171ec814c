//! Filesystem blob store.
//!
//! Stores blobs in a two-level fan-out directory structure:
//! `<root>/<key[0:2]>/<key>/{source.js,bytecode.bin,meta.json}`
//!
//! Features:
//! - Atomic writes via write-to-temp-then-rename
//! - Exclusive ownership of the root through a [`StoreLock`]
//! - Orphaned temp file cleanup for crashed writers

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::blob::{BlobKind, BlobStore, ListAll};
use crate::error::{StoreError, StoreResult};
use crate::key::CacheKey;
use crate::lock::StoreLock;

/// Prefix of in-progress temp files.
const TEMP_PREFIX: &str = ".tmp.";

/// Blob store rooted at a directory.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    _lock: StoreLock,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Waits up to `lock_timeout` for another owner of the directory to go
    /// away.
    pub fn open(root: impl AsRef<Path>, lock_timeout: Duration) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let lock = StoreLock::acquire(&root, lock_timeout)?;

        // Verify the store is writable
        let test_file = root.join(".store_test");
        File::create(&test_file)?;
        fs::remove_file(&test_file)?;

        Ok(Self { root, _lock: lock })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.shard()).join(key.as_str())
    }

    fn blob_path(&self, key: &CacheKey, kind: BlobKind) -> PathBuf {
        self.entry_dir(key).join(kind.file_name())
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(".tmp")
    }

    fn write_temp(&self, temp_path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(temp_path)?;
        file.write_all(bytes)?;
        file.flush()
    }

    /// Total bytes across all stored blobs.
    pub fn total_size(&self) -> StoreResult<u64> {
        let mut total = 0u64;
        for entry in self.walk_blobs() {
            let entry = entry.map_err(io::Error::from)?;
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
        Ok(total)
    }

    /// Remove temp files older than `max_age` left behind by interrupted writes.
    pub fn cleanup_orphaned_temps(&self, max_age: Duration) -> StoreResult<usize> {
        let temp_dir = self.temp_dir();
        if !temp_dir.exists() {
            return Ok(0);
        }

        let mut cleaned = 0;
        for entry in fs::read_dir(&temp_dir)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TEMP_PREFIX));
            if !is_temp {
                continue;
            }
            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            if age.is_some_and(|age| age >= max_age) && fs::remove_file(&path).is_ok() {
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            debug!("[store] removed {} orphaned temp files", cleaned);
        }
        Ok(cleaned)
    }

    /// Remove entry directories that have no metadata record.
    ///
    /// Such directories are invisible to [`BlobStore::list_all`] and would
    /// otherwise never be reclaimed.
    pub fn remove_incomplete(&self) -> StoreResult<usize> {
        let mut removed = 0;
        let dirs = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in dirs {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if !entry.path().join(BlobKind::Metadata.file_name()).exists() {
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn walk_blobs(&self) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
        WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &CacheKey, kind: BlobKind, bytes: &[u8]) -> StoreResult<()> {
        let temp_dir = self.temp_dir();
        fs::create_dir_all(&temp_dir)?;

        let temp_path = temp_dir.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
        if let Err(e) = self.write_temp(&temp_path, bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        let entry_dir = self.entry_dir(key);
        if let Err(e) = fs::create_dir_all(&entry_dir) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        if let Err(e) = fs::rename(&temp_path, self.blob_path(key, kind)) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        Ok(())
    }

    fn get(&self, key: &CacheKey, kind: BlobKind) -> Option<Vec<u8>> {
        let path = self.blob_path(key, kind);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("[store] failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn delete_kind(&self, key: &CacheKey, kind: BlobKind) -> StoreResult<()> {
        ignore_not_found(fs::remove_file(self.blob_path(key, kind)))?;
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> StoreResult<()> {
        // Metadata goes first so a partially deleted entry is never listed.
        for kind in BlobKind::ALL {
            self.delete_kind(key, kind)?;
        }
        ignore_not_found(fs::remove_dir(self.entry_dir(key)))?;

        // Drop the shard directory once it empties; a non-empty shard is fine.
        let _ = fs::remove_dir(self.root.join(key.shard()));
        Ok(())
    }

    fn list_all(&self) -> ListAll<'_> {
        let meta_name = BlobKind::Metadata.file_name();
        let iter = self.walk_blobs().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("[store] skipping unreadable path: {}", e);
                    return None;
                }
            };
            if entry.file_name() != meta_name {
                return None;
            }

            let dir_name = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())?;
            let key = match CacheKey::parse(dir_name) {
                Ok(key) => key,
                Err(e) => {
                    warn!("[store] skipping {}: {}", entry.path().display(), e);
                    return None;
                }
            };

            match fs::read(entry.path()) {
                Ok(bytes) => Some((key, bytes)),
                Err(e) => {
                    warn!("[store] skipping {}: {}", entry.path().display(), e);
                    None
                }
            }
        });
        Box::new(iter)
    }
}
