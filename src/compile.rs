//! Background compile queue
//!
//! A fixed pool of worker threads fed by a bounded channel. Each job
//! compiles one fetched source and attaches the bytecode to the index only
//! if the entry still holds that exact source. Bytecode is optional, so a
//! full queue drops the job and a failed compilation is only logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::index::{AttachError, CacheIndex};

/// Default number of compile workers.
pub const DEFAULT_COMPILE_WORKERS: usize = 1;

/// Default bound on queued jobs.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One source to compile.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub url: String,
    pub source: String,
    pub source_digest: String,
}

/// Outcome counters since the queue started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStats {
    /// Bytecode attached to the index
    pub compiled: u64,
    /// Engine rejected the source
    pub failed: u64,
    /// Queue full or closed
    pub dropped: u64,
    /// Compiled, but the entry changed or vanished meanwhile
    pub stale: u64,
}

#[derive(Debug, Default)]
struct Counters {
    compiled: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    stale: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CompileStats {
        CompileStats {
            compiled: self.compiled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// Jobs accepted but not yet finished.
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

struct Shared {
    index: Arc<CacheIndex>,
    engine: Arc<dyn Engine>,
    counters: Counters,
    pending: Pending,
}

/// Bounded pool of compile workers.
pub struct CompileQueue {
    sender: Mutex<Option<SyncSender<CompileJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl CompileQueue {
    pub fn new(
        index: Arc<CacheIndex>,
        engine: Arc<dyn Engine>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            index,
            engine,
            counters: Counters::default(),
            pending: Pending::default(),
        });

        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers {
            let rx = Arc::clone(&rx);
            let shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name(format!("jscache-compile-{}", n))
                .spawn(move || worker_loop(&rx, &shared))
            {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("[compile] failed to spawn worker {}: {}", n, e),
            }
        }

        let sender = if handles.is_empty() {
            warn!("[compile] no workers running, background compilation disabled");
            None
        } else {
            Some(tx)
        };

        Self {
            sender: Mutex::new(sender),
            workers: Mutex::new(handles),
            shared,
        }
    }

    /// Queue a job. Returns `false` if it was dropped.
    pub fn submit(&self, job: CompileJob) -> bool {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("[compile] queue closed, dropping {}", job.url);
            return false;
        };

        self.shared.pending.add();
        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.shared.pending.done();
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("[compile] queue full, dropping {}", job.url);
                false
            }
        }
    }

    pub fn stats(&self) -> CompileStats {
        self.shared.counters.snapshot()
    }

    /// Block until every accepted job has finished or `timeout` passes.
    ///
    /// Returns whether the queue went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.shared.pending.count.lock();
        while *count > 0 {
            if self
                .shared
                .pending
                .idle
                .wait_until(&mut count, deadline)
                .timed_out()
            {
                return *count == 0;
            }
        }
        true
    }

    /// Stop accepting jobs, finish queued ones and join the workers.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("[compile] worker panicked");
            }
        }
    }
}

impl Drop for CompileQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CompileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileQueue")
            .field("workers", &self.workers.lock().len())
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(rx: &Mutex<Receiver<CompileJob>>, shared: &Shared) {
    loop {
        // Hold the receiver only while waiting for the next job.
        let job = rx.lock().recv();
        let Ok(job) = job else {
            break;
        };
        run_job(shared, job);
        shared.pending.done();
    }
}

fn run_job(shared: &Shared, job: CompileJob) {
    let bytecode = match shared.engine.compile(&job.source) {
        Ok(bytecode) => bytecode,
        Err(e) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!("[compile] {}: {}", job.url, e);
            return;
        }
    };

    match shared
        .index
        .put_bytecode_if_current(&job.url, &job.source_digest, bytecode)
    {
        Ok(()) => {
            shared.counters.compiled.fetch_add(1, Ordering::Relaxed);
            debug!("[compile] attached bytecode for {}", job.url);
        }
        Err(AttachError::Stale { .. }) | Err(AttachError::NotFound(_)) => {
            shared.counters.stale.fetch_add(1, Ordering::Relaxed);
            debug!("[compile] discarding stale bytecode for {}", job.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::entry::CacheEntry;
    use crate::index::IndexLimits;
    use crate::mock::MockEngine;

    fn setup(engine: MockEngine) -> (Arc<CacheIndex>, Arc<MockEngine>) {
        let index = Arc::new(CacheIndex::in_memory(IndexLimits::default()));
        (index, Arc::new(engine))
    }

    fn job_for(entry: &CacheEntry) -> CompileJob {
        CompileJob {
            url: entry.url.clone(),
            source: entry.source_text.clone(),
            source_digest: entry.source_digest().to_string(),
        }
    }

    #[test]
    fn test_compiles_and_attaches() {
        let (index, engine) = setup(MockEngine::new());
        let entry = CacheEntry::new("u", "1 + 1", SystemClock.now());
        index.put(entry.clone());

        let queue = CompileQueue::new(index.clone(), engine.clone(), 2, 8);
        assert!(queue.submit(job_for(&entry)));
        assert!(queue.wait_idle(Duration::from_secs(5)));

        assert_eq!(index.get_bytecode("u").unwrap(), b"bytecode:1 + 1");
        assert_eq!(queue.stats().compiled, 1);
        assert_eq!(engine.compile_count(), 1);
    }

    #[test]
    fn test_failed_compile_is_counted() {
        let engine = MockEngine::new();
        engine.fail_compiles(true);
        let (index, engine) = setup(engine);
        let entry = CacheEntry::new("u", "syntax error(", SystemClock.now());
        index.put(entry.clone());

        let queue = CompileQueue::new(index.clone(), engine, 1, 8);
        queue.submit(job_for(&entry));
        assert!(queue.wait_idle(Duration::from_secs(5)));

        assert!(index.get_bytecode("u").is_none());
        assert_eq!(queue.stats().failed, 1);
    }

    #[test]
    fn test_stale_job_is_discarded() {
        let (index, engine) = setup(MockEngine::new());
        let old = CacheEntry::new("u", "v1", SystemClock.now());
        index.put(old.clone());
        index.put(CacheEntry::new("u", "v2", SystemClock.now()));

        let queue = CompileQueue::new(index.clone(), engine, 1, 8);
        queue.submit(job_for(&old));
        assert!(queue.wait_idle(Duration::from_secs(5)));

        assert!(index.get_bytecode("u").is_none());
        assert_eq!(queue.stats().stale, 1);
    }

    #[test]
    fn test_full_queue_drops() {
        let engine = MockEngine::new().with_compile_delay(Duration::from_millis(200));
        let (index, engine) = setup(engine);
        let entry = CacheEntry::new("u", "x", SystemClock.now());
        index.put(entry.clone());

        let queue = CompileQueue::new(index, engine, 1, 1);
        let accepted = (0..10).filter(|_| queue.submit(job_for(&entry))).count();

        // One job in the worker, one in the channel.
        assert!(accepted <= 2);
        assert_eq!(queue.stats().dropped as usize, 10 - accepted);
        queue.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_drops() {
        let (index, engine) = setup(MockEngine::new());
        let queue = CompileQueue::new(index, engine, 1, 4);
        queue.shutdown();
        queue.shutdown();

        let job = CompileJob {
            url: "u".into(),
            source: "x".into(),
            source_digest: String::new(),
        };
        assert!(!queue.submit(job));
        assert_eq!(queue.stats().dropped, 1);
    }
}
