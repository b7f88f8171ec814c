//! Shared test fixtures
//!
//! - `TestCache`: a resolver over an on-disk store in a temp dir, with a
//!   manual clock, a scripted HTTP client and a mock engine
//! - helpers for building sources of a given size

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jscache::mock::{MockEngine, MockHttpClient};
use jscache::{
    CacheIndex, Engine, FsBlobStore, IndexLimits, ManualClock, Resolver, ResolverOptions,
};
use tempfile::TempDir;

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const COMPILE_WAIT: Duration = Duration::from_secs(5);

/// A resolver wired to mocks and a temp-dir store.
pub struct TestCache {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub http: Arc<MockHttpClient>,
    pub engine: Arc<MockEngine>,
    pub limits: IndexLimits,
    pub options: ResolverOptions,
    resolver: Option<Resolver>,
}

impl TestCache {
    pub fn new() -> Self {
        Self::with(IndexLimits::default(), ResolverOptions::default(), MockEngine::new())
    }

    pub fn with_limits(limits: IndexLimits) -> Self {
        Self::with(limits, ResolverOptions::default(), MockEngine::new())
    }

    pub fn with_options(options: ResolverOptions) -> Self {
        Self::with(IndexLimits::default(), options, MockEngine::new())
    }

    pub fn with(limits: IndexLimits, options: ResolverOptions, engine: MockEngine) -> Self {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let http = Arc::new(MockHttpClient::new());
        let engine = Arc::new(engine);
        let resolver = build_resolver(dir.path(), &clock, &http, &engine, limits, options);
        Self {
            dir,
            clock,
            http,
            engine,
            limits,
            options,
            resolver: Some(resolver),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        self.resolver.as_ref().unwrap()
    }

    pub fn index(&self) -> &Arc<CacheIndex> {
        self.resolver().index()
    }

    /// Simulate a process restart: drop everything in memory and reopen
    /// the same directory.
    pub fn restart(&mut self) {
        if let Some(resolver) = self.resolver.take() {
            resolver.shutdown();
        }
        self.resolver = Some(build_resolver(
            self.dir.path(),
            &self.clock,
            &self.http,
            &self.engine,
            self.limits,
            self.options,
        ));
    }

    /// Wait for background compilation to finish.
    pub fn settle(&self) {
        assert!(
            self.resolver().wait_for_compiles(COMPILE_WAIT),
            "compile queue did not drain"
        );
    }
}

fn build_resolver(
    root: &Path,
    clock: &Arc<ManualClock>,
    http: &Arc<MockHttpClient>,
    engine: &Arc<MockEngine>,
    limits: IndexLimits,
    options: ResolverOptions,
) -> Resolver {
    let store = FsBlobStore::open(root, LOCK_TIMEOUT).unwrap();
    let index = Arc::new(CacheIndex::open(Arc::new(store), limits, clock.clone()));
    let engine: Arc<dyn Engine> = engine.clone();
    Resolver::new(index, http.clone(), Some(engine), options)
}

/// A syntactically plausible script of exactly `len` bytes.
pub fn script_of_len(len: usize) -> String {
    let mut s = String::from("//");
    while s.len() < len {
        s.push('x');
    }
    s.truncate(len);
    s
}

/// A URL under a fixed test origin.
pub fn url(path: &str) -> String {
    format!("https://cdn.example.test/{}", path)
}
