//! Cache statistics.

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached entries
    pub entry_count: usize,
    /// Source plus bytecode bytes across all entries; metadata records
    /// are not counted. This is the figure the byte budget applies to.
    pub total_bytes: u64,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
    /// Entries that carry compiled bytecode
    pub bytecode_entry_count: usize,
    /// Lookups served from the index
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
}

/// `hits / (hits + misses)`, defined as 0.0 when both are zero.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
