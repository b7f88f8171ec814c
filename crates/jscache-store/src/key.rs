//! Cache key derivation
//!
//! Every cached resource is stored under a key derived from its URL:
//! the SHA-256 digest of the URL bytes, rendered as 64 lowercase hex
//! characters. The key is never stored on its own; it can always be
//! recomputed from the URL recorded in the entry metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Length of a rendered cache key (256-bit digest, hex).
pub const KEY_LEN: usize = 64;

/// Filesystem-safe storage key for a cached URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a URL.
    pub fn derive(url: &str) -> Self {
        Self(sha256_hex(url.as_bytes()))
    }

    /// Parse a rendered key, as found in a storage directory name.
    pub fn parse(s: &str) -> StoreResult<Self> {
        let valid = s.len() == KEY_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(StoreError::InvalidKey(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The rendered key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character prefix used for directory fan-out.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Derive the storage key for a URL.
pub fn derive_key(url: &str) -> CacheKey {
    CacheKey::derive(url)
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = derive_key("http://x/a.js");
        let b = derive_key("http://x/a.js");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), KEY_LEN);
    }

    #[test]
    fn test_derive_known_digest() {
        // sha256("abc")
        assert_eq!(
            derive_key("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_distinct_urls_distinct_keys() {
        assert_ne!(derive_key("http://x/a.js"), derive_key("http://x/b.js"));
    }

    #[test]
    fn test_shard_is_prefix() {
        let key = derive_key("http://x/a.js");
        assert_eq!(key.shard(), &key.as_str()[..2]);
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(CacheKey::parse("abc").is_err());
        assert!(CacheKey::parse(&"G".repeat(KEY_LEN)).is_err());
        assert!(CacheKey::parse(&"A".repeat(KEY_LEN)).is_err());

        let key = derive_key("http://x/a.js");
        assert_eq!(CacheKey::parse(key.as_str()).unwrap(), key);
    }

    #[test]
    fn test_key_serialization() {
        let key = derive_key("http://x/a.js");
        let json = serde_json::to_string(&key).unwrap();
        let parsed: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
        assert!(serde_json::from_str::<CacheKey>("\"nope\"").is_err());
    }
}
