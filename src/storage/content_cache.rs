use std::collections::HashMap;

use parking_lot::Mutex;

use super::CacheStats;

/// A cached file body, keyed by repository-relative path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBody {
    pub path: String,
    pub text: String,
}

#[derive(Debug, Default)]
struct ContentCacheState {
    bodies: Vec<FileBody>,
    index: HashMap<String, usize>,
    hits: u64,
    misses: u64,
}

/// Session-scoped cache of fetched file bodies.
///
/// Bodies keep their insertion order: search results tie-break by the order
/// bodies entered the cache, so the backing store is a `Vec` with a path
/// index rather than a bare map. Entries never expire; the cache lives and
/// dies with the session.
#[derive(Debug, Default)]
pub struct ContentCache {
    state: Mutex<ContentCacheState>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        let mut state = self.state.lock();
        match state.index.get(path).copied() {
            Some(slot) => {
                state.hits += 1;
                Some(state.bodies[slot].text.clone())
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Peek without touching the hit/miss counters.
    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().index.contains_key(path)
    }

    /// Inserts a body. A path already present keeps its original position
    /// and gets its text replaced, so there is at most one body per path.
    pub fn insert(&self, path: impl Into<String>, text: impl Into<String>) {
        let path = path.into();
        let text = text.into();
        let mut state = self.state.lock();
        match state.index.get(&path).copied() {
            Some(slot) => state.bodies[slot].text = text,
            None => {
                let slot = state.bodies.len();
                state.bodies.push(FileBody {
                    path: path.clone(),
                    text,
                });
                state.index.insert(path, slot);
            }
        }
    }

    /// Runs `f` over the cached bodies in insertion order, under the lock.
    /// Callers must not re-enter the cache from `f`.
    pub fn with_bodies<R>(&self, f: impl FnOnce(&[FileBody]) -> R) -> R {
        let state = self.state.lock();
        f(&state.bodies)
    }

    pub fn len(&self) -> usize {
        self.state.lock().bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.bodies.clear();
        state.index.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.bodies.len(),
        }
    }
}
