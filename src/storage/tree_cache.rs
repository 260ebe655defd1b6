use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::CacheStats;
use crate::types::{OwnerRepo, TreeEntry};

/// Default freshness window for cached directory listings.
pub const DEFAULT_TREE_TTL: Duration = Duration::from_secs(5 * 60);

/// Cache key: one directory listing within one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeKey {
    pub owner: String,
    pub repo: String,
    pub path: String,
}

impl TreeKey {
    pub fn new(repo: &OwnerRepo, path: &str) -> Self {
        Self {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            path: path.to_string(),
        }
    }
}

/// A cached value together with the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheRecord<T> {
    pub value: T,
    pub stored_at: Instant,
}

impl<T> CacheRecord<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

#[derive(Debug, Default)]
struct TreeCacheState {
    records: HashMap<TreeKey, CacheRecord<Vec<TreeEntry>>>,
    hits: u64,
    misses: u64,
}

/// In-memory listing cache with lazy expiry.
///
/// Expired records are treated as absent at lookup time and dropped then;
/// there is no background sweeper. [`TreeCache::purge_expired`] exists for
/// callers that want to reclaim memory eagerly, but nothing calls it
/// automatically.
#[derive(Debug)]
pub struct TreeCache {
    state: Mutex<TreeCacheState>,
    ttl: Duration,
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TREE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(TreeCacheState::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached listing if present and fresh. A stale record
    /// counts as a miss and is dropped on the spot.
    pub fn get(&self, key: &TreeKey) -> Option<Vec<TreeEntry>> {
        let mut state = self.state.lock();
        let fresh = state
            .records
            .get(key)
            .and_then(|record| record.is_fresh(self.ttl).then(|| record.value.clone()));
        match fresh {
            Some(value) => {
                state.hits += 1;
                Some(value)
            }
            None => {
                // Absent or stale; removing an absent key is a no-op.
                state.records.remove(key);
                state.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, key: TreeKey, entries: Vec<TreeEntry>) {
        let mut state = self.state.lock();
        state.records.insert(key, CacheRecord::new(entries));
    }

    /// Raw record count, expired records included.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().records.clear();
    }

    /// Drops every stale record and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.records.len();
        let ttl = self.ttl;
        state.records.retain(|_, record| record.is_fresh(ttl));
        before - state.records.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.records.len(),
        }
    }
}
