pub mod content_cache;
pub mod tree_cache;

use serde::Serialize;

pub use content_cache::{ContentCache, FileBody};
pub use tree_cache::{CacheRecord, TreeCache, TreeKey, DEFAULT_TREE_TTL};

/// Hit/miss counters plus current entry count for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; zero when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
