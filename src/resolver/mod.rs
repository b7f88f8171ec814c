//! Fetch-and-populate pipeline
//!
//! [`Resolver::resolve`] is the cache's front door:
//!
//! 1. ask the [`Coordinator`] whether the cached entry can be served;
//! 2. if not, fetch from the origin under the fetch deadline, with at most
//!    one fetch in flight per URL;
//! 3. store the response in the [`CacheIndex`];
//! 4. queue background compilation of the new source.
//!
//! Errors are never cached. A failed fetch leaves any existing entry
//! untouched.
//!
//! Callers that join a flight get a clone of the leader's result. A caller
//! that arrives after the flight has retired reads the entry the leader
//! stored and reports `served_from_cache = true`.

mod coalesce;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::compile::{CompileJob, CompileQueue, CompileStats, DEFAULT_COMPILE_WORKERS, DEFAULT_QUEUE_CAPACITY};
use crate::coordinator::{Coordinator, Decision};
use crate::engine::Engine;
use crate::entry::{CacheEntry, Validator, DEFAULT_TTL};
use crate::http::{HttpClient, HttpRequest, HttpResponse, NetworkError};
use crate::index::{CacheIndex, CacheStats};
use crate::timeout::{run_with_deadline, DeadlineError, TimeoutConfig};

use coalesce::{InFlight, Join};

/// Why a resolve produced no resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("HTTP {status}")]
    Http { status: u16, body: String },

    #[error("response body for {url} is not valid UTF-8")]
    Encoding { url: String },

    #[error("fetch for {url} was abandoned by its leader")]
    Abandoned { url: String },
}

/// A resolved script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub url: String,
    pub source: String,
    pub bytecode: Option<Vec<u8>>,
    /// True when no response body was downloaded
    pub served_from_cache: bool,
}

impl ResolvedResource {
    fn cached(entry: CacheEntry) -> Self {
        Self {
            url: entry.url,
            source: entry.source_text,
            bytecode: entry.bytecode,
            served_from_cache: true,
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Validity window for a freshly fetched entry
    pub ttl: Option<Duration>,
    /// Ignore a fresh cached entry and go to the origin
    pub force_refresh: bool,
}

/// Resolver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub default_ttl: Duration,
    pub fetch_timeout: Duration,
    pub compile_workers: usize,
    pub compile_queue_capacity: usize,
    pub revalidate_with_validators: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            fetch_timeout: TimeoutConfig::default().fetch_timeout(),
            compile_workers: DEFAULT_COMPILE_WORKERS,
            compile_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            revalidate_with_validators: false,
        }
    }
}

/// Owned cache state plus the capabilities it needs.
pub struct Resolver {
    index: Arc<CacheIndex>,
    coordinator: Coordinator,
    http: Arc<dyn HttpClient>,
    compiler: Option<CompileQueue>,
    in_flight: InFlight<Result<ResolvedResource, ResolveError>>,
    options: ResolverOptions,
}

impl Resolver {
    /// Without an engine, no bytecode is ever produced.
    pub fn new(
        index: Arc<CacheIndex>,
        http: Arc<dyn HttpClient>,
        engine: Option<Arc<dyn Engine>>,
        options: ResolverOptions,
    ) -> Self {
        let coordinator =
            Coordinator::new(Arc::clone(&index)).with_revalidation(options.revalidate_with_validators);
        let compiler = engine.map(|engine| {
            CompileQueue::new(
                Arc::clone(&index),
                engine,
                options.compile_workers,
                options.compile_queue_capacity,
            )
        });

        Self {
            index,
            coordinator,
            http,
            compiler,
            in_flight: InFlight::new(),
            options,
        }
    }

    pub fn resolve(&self, url: &str) -> Result<ResolvedResource, ResolveError> {
        self.resolve_with(url, ResolveOptions::default())
    }

    pub fn resolve_with(
        &self,
        url: &str,
        opts: ResolveOptions,
    ) -> Result<ResolvedResource, ResolveError> {
        let decision = self.coordinator.decide_with(url, opts.force_refresh);
        if let Decision::Fresh(entry) = decision {
            debug!("[resolve] {} served from cache", url);
            return Ok(ResolvedResource::cached(entry));
        }

        match self.in_flight.join(url) {
            Join::Follower(flight) => {
                debug!("[resolve] {} joining in-flight fetch", url);
                flight.wait().unwrap_or_else(|| {
                    Err(ResolveError::Abandoned {
                        url: url.to_string(),
                    })
                })
            }
            Join::Leader(guard) => {
                let result = self.lead(url, &decision, opts);
                guard.finish(result.clone());
                result
            }
        }
    }

    fn lead(
        &self,
        url: &str,
        decision: &Decision,
        opts: ResolveOptions,
    ) -> Result<ResolvedResource, ResolveError> {
        // The previous leader may have stored it after our decision.
        if !opts.force_refresh {
            if let Some(entry) = self.index.peek(url) {
                return Ok(ResolvedResource::cached(entry));
            }
        }

        let ttl = opts.ttl.unwrap_or(self.options.default_ttl);
        let response = self.fetch(Coordinator::request_for(url, decision))?;

        if response.is_not_modified() && matches!(decision, Decision::Revalidate(_)) {
            if let Some(entry) = self.index.refresh(url, ttl) {
                info!("[resolve] {} not modified, validity renewed", url);
                return Ok(ResolvedResource::cached(entry));
            }
            // Evicted while the request was out.
            let response = self.fetch(HttpRequest::get(url))?;
            return self.populate(url, response, ttl);
        }

        self.populate(url, response, ttl)
    }

    fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, ResolveError> {
        let http = Arc::clone(&self.http);
        let url = request.url.clone();
        let timeout = self.options.fetch_timeout;

        match run_with_deadline("fetch", timeout, move || http.fetch(&request)) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                warn!("[resolve] fetch {} failed: {}", url, e);
                Err(e.into())
            }
            Err(DeadlineError::Elapsed(after)) => {
                warn!("[resolve] fetch {} timed out after {:?}", url, after);
                Err(NetworkError::Timeout(after).into())
            }
            Err(DeadlineError::Spawn(e)) => Err(NetworkError::Io(e).into()),
            Err(DeadlineError::Panicked) => {
                Err(NetworkError::Other("fetch thread exited without a response".to_string()).into())
            }
        }
    }

    fn populate(
        &self,
        url: &str,
        response: HttpResponse,
        ttl: Duration,
    ) -> Result<ResolvedResource, ResolveError> {
        if !response.is_success() {
            warn!("[resolve] {} returned HTTP {}", url, response.status);
            return Err(ResolveError::Http {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let content_type = response.content_type().map(str::to_string);
        let validator = Validator::from_parts(
            response.etag().map(str::to_string),
            response.last_modified().map(str::to_string),
        );
        let source = String::from_utf8(response.body).map_err(|_| ResolveError::Encoding {
            url: url.to_string(),
        })?;

        let entry = CacheEntry::new(url, source, self.index.clock().now())
            .with_ttl(ttl)
            .with_validator(validator)
            .with_content_type(content_type);
        let job = CompileJob {
            url: url.to_string(),
            source: entry.source_text.clone(),
            source_digest: entry.source_digest().to_string(),
        };
        self.index.put(entry);

        // Identical source keeps its bytecode across a refetch.
        let bytecode = self.index.get_bytecode(url);
        if bytecode.is_none() {
            if let Some(compiler) = &self.compiler {
                compiler.submit(job.clone());
            }
        }

        info!("[resolve] {} fetched ({} bytes)", url, job.source.len());
        Ok(ResolvedResource {
            url: job.url,
            source: job.source,
            bytecode,
            served_from_cache: false,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.index.stats()
    }

    pub fn cached_urls(&self) -> Vec<String> {
        self.index.urls()
    }

    pub fn clear_cache(&self) {
        self.index.clear();
    }

    pub fn remove_cache_entry(&self, url: &str) -> bool {
        self.index.remove(url)
    }

    pub fn compile_stats(&self) -> CompileStats {
        self.compiler
            .as_ref()
            .map(CompileQueue::stats)
            .unwrap_or_default()
    }

    /// Wait for queued compilations. Returns whether the queue drained.
    pub fn wait_for_compiles(&self, timeout: Duration) -> bool {
        self.compiler
            .as_ref()
            .map_or(true, |compiler| compiler.wait_idle(timeout))
    }

    pub fn index(&self) -> &Arc<CacheIndex> {
        &self.index
    }

    /// Number of URLs with a fetch in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop the compile workers. Cached data stays readable.
    pub fn shutdown(&self) {
        if let Some(compiler) = &self.compiler {
            compiler.shutdown();
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("index", &self.index)
            .field("options", &self.options)
            .finish()
    }
}
