//! Cache index
//!
//! The authoritative URL → [`CacheEntry`] map, with hit/miss accounting and
//! size/count-bounded eviction. Every mutation is written through to the
//! [`BlobStore`] while the index lock is held, so the durable copy follows
//! the same order as the in-memory one.
//!
//! Persistence is best effort: a store failure is logged and the in-memory
//! update still applies, keeping the entry usable for the rest of the
//! process.
//!
//! ## Startup
//!
//! [`CacheIndex::open`] rebuilds the map from the store's metadata records.
//! Corrupt, mismatched, incomplete and expired records are deleted and
//! skipped; a bad record never aborts the load.

mod eviction;
mod stats;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use jscache_store::{BlobKind, BlobStore, CacheKey, EntryMetadata, MemoryBlobStore};
use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::entry::{CacheEntry, Validator};

pub use eviction::{select_victims, IndexLimits, DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES};
pub use stats::{hit_rate, CacheStats};

/// Bytecode was offered for a URL with no cached source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no cache entry for {url}")]
pub struct NotFoundError {
    pub url: String,
}

/// Why background bytecode was not attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("source for {url} changed after compilation")]
    Stale { url: String },
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    /// Entries found expired by `get`, swept on the next write.
    scheduled: HashSet<String>,
    /// Write order per URL; breaks `cached_at` ties during eviction.
    seqs: HashMap<String, u64>,
    next_seq: u64,
}

impl IndexState {
    fn insert(&mut self, entry: CacheEntry) {
        self.stamp(&entry.url);
        self.entries.insert(entry.url.clone(), entry);
    }

    fn stamp(&mut self, url: &str) {
        self.next_seq += 1;
        self.seqs.insert(url.to_string(), self.next_seq);
    }

    fn take(&mut self, url: &str) -> Option<CacheEntry> {
        self.seqs.remove(url);
        self.scheduled.remove(url);
        self.entries.remove(url)
    }
}

/// In-memory cache index backed by a blob store.
pub struct CacheIndex {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    limits: IndexLimits,
    state: Mutex<IndexState>,
}

impl CacheIndex {
    /// Open an index over `store`, loading every valid stored entry.
    pub fn open(store: Arc<dyn BlobStore>, limits: IndexLimits, clock: Arc<dyn Clock>) -> Self {
        let index = Self {
            store,
            clock,
            limits,
            state: Mutex::new(IndexState::default()),
        };
        index.load();
        index
    }

    /// An index with no durable backing.
    pub fn in_memory(limits: IndexLimits) -> Self {
        Self::open(Arc::new(MemoryBlobStore::new()), limits, Arc::new(SystemClock))
    }

    pub fn limits(&self) -> IndexLimits {
        self.limits
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn load(&self) {
        let now = self.clock.now();
        let mut loaded = Vec::new();
        let mut discarded = Vec::new();

        for (key, bytes) in self.store.list_all() {
            match self.load_one(&key, &bytes, now) {
                Ok(entry) => loaded.push(entry),
                Err(reason) => {
                    debug!("[index] discarding stored entry {}: {}", key, reason);
                    discarded.push(key);
                }
            }
        }

        for key in &discarded {
            if let Err(e) = self.store.delete(key) {
                warn!("[index] failed to delete stored entry {}: {}", key, e);
            }
        }

        // Stored order is lost; replay oldest first.
        loaded.sort_by(|a, b| (a.cached_at, &a.url).cmp(&(b.cached_at, &b.url)));
        let mut state = self.state.lock();
        for entry in loaded {
            state.insert(entry);
        }
        self.enforce_limits(&mut state);

        if !state.entries.is_empty() || !discarded.is_empty() {
            info!(
                "[index] loaded {} entries, discarded {}",
                state.entries.len(),
                discarded.len()
            );
        }
    }

    fn load_one(
        &self,
        key: &CacheKey,
        meta_bytes: &[u8],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<CacheEntry, String> {
        let meta = EntryMetadata::from_bytes(meta_bytes).map_err(|e| e.to_string())?;
        if meta.key() != *key {
            return Err(format!("stored under the wrong key for {}", meta.url));
        }

        let source = self
            .store
            .get(key, BlobKind::Source)
            .ok_or_else(|| "missing source blob".to_string())?;
        let source = String::from_utf8(source).map_err(|_| "source is not UTF-8".to_string())?;
        let bytecode = self.store.get(key, BlobKind::Bytecode);

        let entry = CacheEntry::from_parts(meta, source, bytecode)
            .ok_or_else(|| "source does not match recorded digest".to_string())?;
        if entry.is_expired(now) {
            return Err("expired".to_string());
        }
        Ok(entry)
    }

    /// Look up a usable entry.
    ///
    /// A fresh entry counts as a hit. A missing or expired entry counts as a
    /// miss; an expired one is scheduled for eviction and reported absent.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let fresh = match state.entries.get(url) {
            Some(entry) if !entry.is_expired(now) => Some(entry.clone()),
            Some(_) => {
                state.scheduled.insert(url.to_string());
                None
            }
            None => None,
        };

        if fresh.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        fresh
    }

    /// Like [`get`](Self::get) but without touching the counters.
    pub fn peek(&self, url: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .entries
            .get(url)
            .filter(|entry| !entry.is_expired(now))
            .cloned()
    }

    /// Insert or replace an entry, then enforce the limits.
    ///
    /// Replacing an entry with different source text drops its bytecode
    /// unless the new entry brings its own. Identical source keeps the
    /// existing bytecode.
    pub fn put(&self, mut entry: CacheEntry) {
        let mut state = self.state.lock();

        let previous = state.entries.get(&entry.url);
        let source_changed = previous.map_or(true, |p| p.source_digest() != entry.source_digest());
        if !source_changed && entry.bytecode.is_none() {
            entry.bytecode = previous.and_then(|p| p.bytecode.clone());
        }

        self.persist(&entry, source_changed);
        state.scheduled.remove(&entry.url);
        state.insert(entry);
        self.enforce_limits(&mut state);
    }

    /// Compiled bytecode for `url`, if a fresh entry has any.
    pub fn get_bytecode(&self, url: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .entries
            .get(url)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.bytecode.clone())
    }

    /// Attach bytecode to an existing entry.
    pub fn put_bytecode(&self, url: &str, bytecode: Vec<u8>) -> Result<(), NotFoundError> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(url).ok_or_else(|| NotFoundError {
            url: url.to_string(),
        })?;
        entry.bytecode = Some(bytecode);
        self.persist_bytecode(entry);
        self.enforce_limits(&mut state);
        Ok(())
    }

    /// Attach bytecode only if the entry still holds the source it was
    /// compiled from.
    pub fn put_bytecode_if_current(
        &self,
        url: &str,
        source_digest: &str,
        bytecode: Vec<u8>,
    ) -> Result<(), AttachError> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(url).ok_or_else(|| NotFoundError {
            url: url.to_string(),
        })?;
        if entry.source_digest() != source_digest {
            return Err(AttachError::Stale {
                url: url.to_string(),
            });
        }
        entry.bytecode = Some(bytecode);
        self.persist_bytecode(entry);
        self.enforce_limits(&mut state);
        Ok(())
    }

    /// Validator of an entry that exists but has expired.
    pub fn stale_validator(&self, url: &str) -> Option<Validator> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .entries
            .get(url)
            .filter(|entry| entry.is_expired(now))
            .and_then(|entry| entry.validator.clone())
    }

    /// Restart an entry's validity window, keeping its source and bytecode.
    ///
    /// Used when the origin confirms the cached copy is current.
    pub fn refresh(&self, url: &str, ttl: Duration) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(url)?;
        entry.cached_at = now;
        entry.ttl = ttl;
        self.persist_metadata(entry);
        let refreshed = entry.clone();
        state.scheduled.remove(url);
        state.stamp(url);
        Some(refreshed)
    }

    /// Evict one entry from memory and storage. Returns whether it existed.
    pub fn remove(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        match state.take(url) {
            Some(entry) => {
                self.delete_durable(&entry.key());
                true
            }
            None => false,
        }
    }

    /// Evict everything and reset the counters.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for entry in state.entries.values() {
            self.delete_durable(&entry.key());
        }
        // Records that never made it into memory
        let stragglers: Vec<CacheKey> = self.store.list_all().map(|(key, _)| key).collect();
        for key in &stragglers {
            self.delete_durable(key);
        }
        *state = IndexState::default();
        info!("[index] cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entry_count: state.entries.len(),
            total_bytes: state.entries.values().map(|e| e.size_bytes() as u64).sum(),
            hit_rate: hit_rate(state.hits, state.misses),
            bytecode_entry_count: state.entries.values().filter(|e| e.bytecode.is_some()).count(),
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Cached URLs, sorted.
    pub fn urls(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut urls: Vec<String> = state.entries.keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enforce_limits(&self, state: &mut IndexState) {
        let now = self.clock.now();
        let scheduled: Vec<String> = state.scheduled.drain().collect();
        for url in scheduled {
            if state.entries.get(&url).is_some_and(|e| e.is_expired(now)) {
                debug!("[index] evicting expired {}", url);
                self.evict(state, &url);
            }
        }

        for url in select_victims(&state.entries, &state.seqs, &self.limits) {
            debug!("[index] evicting {} to stay within limits", url);
            self.evict(state, &url);
        }
    }

    fn evict(&self, state: &mut IndexState, url: &str) {
        if let Some(entry) = state.take(url) {
            self.delete_durable(&entry.key());
        }
    }

    fn delete_durable(&self, key: &CacheKey) {
        // A leftover record is reclaimed by the next startup load.
        if let Err(e) = self.store.delete(key) {
            warn!("[index] failed to delete stored entry {}: {}", key, e);
        }
    }

    fn persist(&self, entry: &CacheEntry, source_changed: bool) {
        let key = entry.key();
        let result = (|| {
            if source_changed {
                // Stale bytecode must never sit next to new source.
                self.store.delete_kind(&key, BlobKind::Bytecode)?;
                self.store.put(&key, BlobKind::Source, entry.source_text.as_bytes())?;
            }
            if let Some(bytecode) = &entry.bytecode {
                self.store.put(&key, BlobKind::Bytecode, bytecode)?;
            }
            self.store.put(&key, BlobKind::Metadata, &entry.to_metadata().to_bytes()?)
        })();
        if let Err(e) = result {
            warn!("[index] failed to persist {}: {}", entry.url, e);
        }
    }

    fn persist_bytecode(&self, entry: &CacheEntry) {
        let key = entry.key();
        let result = (|| {
            if let Some(bytecode) = &entry.bytecode {
                self.store.put(&key, BlobKind::Bytecode, bytecode)?;
            }
            self.store.put(&key, BlobKind::Metadata, &entry.to_metadata().to_bytes()?)
        })();
        if let Err(e) = result {
            warn!("[index] failed to persist bytecode for {}: {}", entry.url, e);
        }
    }

    fn persist_metadata(&self, entry: &CacheEntry) {
        let result = entry
            .to_metadata()
            .to_bytes()
            .and_then(|bytes| self.store.put(&entry.key(), BlobKind::Metadata, &bytes));
        if let Err(e) = result {
            warn!("[index] failed to persist metadata for {}: {}", entry.url, e);
        }
    }
}

impl std::fmt::Debug for CacheIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheIndex")
            .field("limits", &self.limits)
            .field("entries", &self.len())
            .finish()
    }
}
