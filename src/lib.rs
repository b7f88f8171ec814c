//! jscache - cache for remote JavaScript source and compiled bytecode
//!
//! Fetches scripts over HTTP, keeps them in an in-memory index backed by a
//! durable blob store, and serves later requests without refetching or
//! recompiling while the cached copy is provably valid.
//!
//! The engine and the network are capabilities ([`engine::Engine`],
//! [`http::HttpClient`]); [`resolver::Resolver`] ties them together.

pub mod clock;
pub mod compile;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod entry;
pub mod http;
pub mod index;
pub mod mock;
pub mod resolver;
pub mod timeout;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheSettings, ConfigError, EffectiveConfig};
pub use coordinator::{Coordinator, Decision};
pub use engine::{CompileError, Engine, ExecutionError, ExecutionResult};
pub use entry::{CacheEntry, Validator};
pub use http::{HttpClient, HttpRequest, HttpResponse, NetworkError};
pub use index::{CacheIndex, CacheStats, IndexLimits};
pub use resolver::{ResolveError, ResolveOptions, ResolvedResource, Resolver, ResolverOptions};

pub use jscache_store::{derive_key, BlobKind, BlobStore, CacheKey, FsBlobStore, MemoryBlobStore, StoreError};
