//! Cache entry model
//!
//! A [`CacheEntry`] is everything cached for one URL: the source text, the
//! optional compiled bytecode, the origin's validators and the validity
//! window. The storage key is always derived from the URL.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jscache_store::{sha256_hex, CacheKey, EntryMetadata, METADATA_VERSION};

use crate::clock::{duration_millis, from_millis, truncate_millis};

/// Default validity window when the caller gives none.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Conditional-request tokens from the origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validator {
    /// `None` when the origin sent neither token.
    pub fn from_parts(etag: Option<String>, last_modified: Option<String>) -> Option<Self> {
        if etag.is_none() && last_modified.is_none() {
            None
        } else {
            Some(Self {
                etag,
                last_modified,
            })
        }
    }
}

/// One cached resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub source_text: String,
    pub bytecode: Option<Vec<u8>>,
    pub validator: Option<Validator>,
    pub content_type: Option<String>,
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
    source_digest: String,
}

impl CacheEntry {
    /// A fresh entry with no bytecode and the default TTL.
    pub fn new(url: impl Into<String>, source_text: impl Into<String>, cached_at: DateTime<Utc>) -> Self {
        let source_text = source_text.into();
        Self {
            url: url.into(),
            source_digest: sha256_hex(source_text.as_bytes()),
            source_text,
            bytecode: None,
            validator: None,
            content_type: None,
            cached_at: truncate_millis(cached_at),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_validator(mut self, validator: Option<Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_bytecode(mut self, bytecode: Vec<u8>) -> Self {
        self.bytecode = Some(bytecode);
        self
    }

    /// Storage key, derived from the URL.
    pub fn key(&self) -> CacheKey {
        CacheKey::derive(&self.url)
    }

    /// SHA-256 hex of the source text.
    pub fn source_digest(&self) -> &str {
        &self.source_digest
    }

    /// Source plus bytecode length.
    pub fn size_bytes(&self) -> usize {
        self.source_text.len() + self.bytecode.as_ref().map_or(0, Vec::len)
    }

    /// True iff `now - cached_at > ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.cached_at).num_milliseconds();
        age_ms > duration_millis(self.ttl)
    }

    /// Revalidation is required exactly when the entry has expired.
    pub fn needs_revalidation(&self, now: DateTime<Utc>) -> bool {
        self.is_expired(now)
    }

    pub fn etag(&self) -> Option<&str> {
        self.validator.as_ref().and_then(|v| v.etag.as_deref())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.validator.as_ref().and_then(|v| v.last_modified.as_deref())
    }

    /// Metadata record persisted next to the source blob.
    pub fn to_metadata(&self) -> EntryMetadata {
        EntryMetadata {
            version: METADATA_VERSION,
            url: self.url.clone(),
            etag: self.etag().map(str::to_string),
            last_modified: self.last_modified().map(str::to_string),
            content_type: self.content_type.clone(),
            cached_at: self.cached_at.timestamp_millis(),
            ttl_ms: u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
            size_bytes: self.size_bytes() as u64,
            source_digest: self.source_digest.clone(),
        }
    }

    /// Rebuild an entry from its persisted parts.
    ///
    /// Returns `None` when the source does not match the recorded digest or
    /// the timestamp is out of range.
    pub fn from_parts(
        meta: EntryMetadata,
        source_text: String,
        bytecode: Option<Vec<u8>>,
    ) -> Option<Self> {
        let cached_at = from_millis(meta.cached_at)?;
        let entry = Self {
            url: meta.url,
            source_digest: sha256_hex(source_text.as_bytes()),
            source_text,
            bytecode,
            validator: Validator::from_parts(meta.etag, meta.last_modified),
            content_type: meta.content_type,
            cached_at,
            ttl: Duration::from_millis(meta.ttl_ms),
        };
        if !meta.source_digest.is_empty() && meta.source_digest != entry.source_digest {
            return None;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_millis;

    fn t(ms: i64) -> DateTime<Utc> {
        from_millis(ms).unwrap()
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = CacheEntry::new("http://x/a.js", "console.log(1)", t(0));
        assert_eq!(entry.ttl, DEFAULT_TTL);
        assert!(entry.bytecode.is_none());
        assert_eq!(entry.size_bytes(), 14);
        assert_eq!(entry.key(), CacheKey::derive("http://x/a.js"));
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new("u", "s", t(1_000)).with_ttl(Duration::from_millis(500));
        assert!(!entry.is_expired(t(1_499)));
        assert!(!entry.is_expired(t(1_500)));
        assert!(entry.is_expired(t(1_501)));
        assert_eq!(entry.needs_revalidation(t(1_501)), entry.is_expired(t(1_501)));
    }

    #[test]
    fn test_size_includes_bytecode() {
        let entry = CacheEntry::new("u", "abcd", t(0)).with_bytecode(vec![0; 6]);
        assert_eq!(entry.size_bytes(), 10);
    }

    #[test]
    fn test_validator_from_parts() {
        assert!(Validator::from_parts(None, None).is_none());
        let v = Validator::from_parts(Some("\"x\"".into()), None).unwrap();
        assert_eq!(v.etag.as_deref(), Some("\"x\""));
    }

    #[test]
    fn test_metadata_round_trip() {
        let entry = CacheEntry::new("http://x/a.js", "let a = 1;", t(1_700_000_000_123))
            .with_ttl(Duration::from_millis(60_000))
            .with_content_type(Some("text/javascript".into()))
            .with_validator(Validator::from_parts(
                Some("\"v1\"".into()),
                Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            ));

        let meta = entry.to_metadata();
        assert_eq!(meta.cached_at, 1_700_000_000_123);
        assert_eq!(meta.ttl_ms, 60_000);

        let rebuilt = CacheEntry::from_parts(meta, entry.source_text.clone(), None).unwrap();
        assert_eq!(rebuilt, entry);
    }

    #[test]
    fn test_from_parts_rejects_mismatched_source() {
        let entry = CacheEntry::new("u", "original", t(0));
        let meta = entry.to_metadata();
        assert!(CacheEntry::from_parts(meta, "tampered".into(), None).is_none());
    }
}
