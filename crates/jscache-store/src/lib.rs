//! Durable storage for the JavaScript resource cache
//!
//! - [`CacheKey`]: SHA-256 of the resource URL, 64 hex characters
//! - [`BlobStore`]: source / bytecode / metadata blobs per key
//! - [`FsBlobStore`]: fan-out directory store with atomic writes
//! - [`MemoryBlobStore`]: non-durable store for tests
//! - [`EntryMetadata`]: the JSON metadata record

pub mod blob;
pub mod error;
pub mod fs_store;
pub mod key;
pub mod lock;
pub mod memory;
pub mod metadata;

pub use blob::{BlobKind, BlobStore, ListAll};
pub use error::{StoreError, StoreResult};
pub use fs_store::FsBlobStore;
pub use key::{derive_key, sha256_hex, CacheKey, KEY_LEN};
pub use lock::{LockError, LockResult, StoreLock};
pub use memory::MemoryBlobStore;
pub use metadata::{EntryMetadata, METADATA_VERSION};
