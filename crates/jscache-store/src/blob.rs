//! Blob store interface
//!
//! A blob store keeps up to three named byte sequences per cache key:
//! the JavaScript source, the compiled bytecode, and the metadata record.

use crate::error::StoreResult;
use crate::key::CacheKey;

/// The kind of blob stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Source,
    Bytecode,
    Metadata,
}

impl BlobKind {
    /// All kinds, in the order they are removed on delete.
    pub const ALL: [BlobKind; 3] = [BlobKind::Metadata, BlobKind::Bytecode, BlobKind::Source];

    /// File name used by the filesystem store.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Source => "source.js",
            Self::Bytecode => "bytecode.bin",
            Self::Metadata => "meta.json",
        }
    }
}

/// Single pass over every stored `(key, metadata bytes)` pair.
pub type ListAll<'a> = Box<dyn Iterator<Item = (CacheKey, Vec<u8>)> + Send + 'a>;

/// Durable byte-oriented key/value storage.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`/`kind`, replacing any previous value.
    ///
    /// Readers never observe a partially written blob.
    fn put(&self, key: &CacheKey, kind: BlobKind, bytes: &[u8]) -> StoreResult<()>;

    /// Read a blob. Absence and unreadable blobs both yield `None`.
    fn get(&self, key: &CacheKey, kind: BlobKind) -> Option<Vec<u8>>;

    /// Remove one blob. Removing an absent blob is not an error.
    fn delete_kind(&self, key: &CacheKey, kind: BlobKind) -> StoreResult<()>;

    /// Remove every blob for `key`. Idempotent.
    fn delete(&self, key: &CacheKey) -> StoreResult<()>;

    /// Lazily enumerate all stored metadata records.
    ///
    /// Entries that cannot be read are logged and skipped. A second call
    /// re-reads storage.
    fn list_all(&self) -> ListAll<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_distinct() {
        let names: std::collections::HashSet<_> =
            BlobKind::ALL.iter().map(|k| k.file_name()).collect();
        assert_eq!(names.len(), 3);
    }
}
