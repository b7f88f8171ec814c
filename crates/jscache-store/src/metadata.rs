//! Durable metadata record
//!
//! One JSON document per cached resource. It carries everything needed to
//! rebuild the in-memory entry at startup except the source and bytecode
//! bytes, which live in their own blobs under the same key.

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::key::CacheKey;

/// Current metadata format version.
pub const METADATA_VERSION: u32 = 1;

/// Metadata blob for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// The URL this entry caches
    pub url: String,
    /// ETag response header, if the origin sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last-Modified response header, if the origin sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Content-Type response header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Write time, milliseconds since the Unix epoch
    pub cached_at: i64,
    /// Validity window in milliseconds
    pub ttl_ms: u64,
    /// Source plus bytecode length at write time
    #[serde(default)]
    pub size_bytes: u64,
    /// SHA-256 hex of the source blob
    #[serde(default)]
    pub source_digest: String,
}

fn default_version() -> u32 {
    METADATA_VERSION
}

impl EntryMetadata {
    /// Key the metadata belongs under.
    pub fn key(&self) -> CacheKey {
        CacheKey::derive(&self.url)
    }

    /// Serialize to the on-disk form.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse the on-disk form.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
