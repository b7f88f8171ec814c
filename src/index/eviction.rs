//! Eviction policy
//!
//! Entries are evicted oldest-`cached_at` first (insertion time, not last
//! access). Two limits apply after every write:
//! - entry count: evict until at most `max_entries` remain
//! - total bytes: once over `max_bytes`, evict until at most 90% of the
//!   budget is used, so the next write does not immediately trip it again

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Default byte budget (50 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Size and count bounds for the index.
///
/// `max_bytes` counts source and bytecode only; metadata records are not
/// part of the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLimits {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl IndexLimits {
    pub fn new(max_entries: usize, max_bytes: u64) -> Self {
        Self {
            max_entries,
            max_bytes,
        }
    }

    /// Byte total that byte-budget eviction drives down to.
    pub fn headroom_target(&self) -> u64 {
        self.max_bytes - self.max_bytes / 10
    }
}

/// URLs to evict, oldest first, so both limits hold afterwards.
///
/// Ties on `cached_at` are broken by `seqs`, the order in which the index
/// last wrote each entry, so a write never evicts itself in favour of an
/// older entry stamped in the same millisecond. URLs without a sequence
/// number sort first.
pub fn select_victims(
    entries: &HashMap<String, CacheEntry>,
    seqs: &HashMap<String, u64>,
    limits: &IndexLimits,
) -> Vec<String> {
    let mut order: Vec<_> = entries
        .values()
        .map(|e| {
            let seq = seqs.get(&e.url).copied().unwrap_or(0);
            (e.cached_at, seq, e.url.as_str(), e.size_bytes() as u64)
        })
        .collect();
    order.sort();

    let mut count = order.len();
    let mut total: u64 = order.iter().map(|(_, _, _, size)| size).sum();
    let mut oldest = order.into_iter();
    let mut victims = Vec::new();

    while count > limits.max_entries {
        let Some((_, _, url, size)) = oldest.next() else {
            break;
        };
        victims.push(url.to_string());
        count -= 1;
        total -= size;
    }

    if total > limits.max_bytes {
        let target = limits.headroom_target();
        while total > target {
            let Some((_, _, url, size)) = oldest.next() else {
                break;
            };
            victims.push(url.to_string());
            total -= size;
        }
    }

    victims
}
