//! Scripted [`RepoHost`] for unit tests. HTTP-level behavior is covered by
//! wiremock in `github.rs`; everything above the client tests against this.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::github::RepoHost;
use crate::types::{FetchError, OwnerRepo, TreeEntry};

#[derive(Default)]
pub(crate) struct FakeHost {
    listings: Mutex<HashMap<String, Vec<TreeEntry>>>,
    bodies: Mutex<HashMap<String, String>>,
    list_failures: Mutex<HashMap<String, FetchError>>,
    body_failures: Mutex<HashMap<String, FetchError>>,
    languages: Mutex<BTreeMap<String, u64>>,
    list_calls: AtomicUsize,
    body_calls: AtomicUsize,
    fetched_paths: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(self, path: &str, entries: Vec<TreeEntry>) -> Self {
        self.listings.lock().insert(path.to_string(), entries);
        self
    }

    pub fn with_body(self, path: &str, text: &str) -> Self {
        self.bodies.lock().insert(path.to_string(), text.to_string());
        self
    }

    /// Listing scoped to one repository slug (`owner/repo`). Takes
    /// precedence over the unscoped `with_dir` listing for that repository.
    pub fn with_repo_dir(self, slug: &str, path: &str, entries: Vec<TreeEntry>) -> Self {
        self.listings
            .lock()
            .insert(format!("{}:{}", slug, path), entries);
        self
    }

    /// Body scoped to one repository slug.
    pub fn with_repo_body(self, slug: &str, path: &str, text: &str) -> Self {
        self.bodies
            .lock()
            .insert(format!("{}:{}", slug, path), text.to_string());
        self
    }

    pub fn with_list_failure(self, path: &str, err: FetchError) -> Self {
        self.list_failures.lock().insert(path.to_string(), err);
        self
    }

    pub fn with_body_failure(self, path: &str, err: FetchError) -> Self {
        self.body_failures.lock().insert(path.to_string(), err);
        self
    }

    pub fn with_languages(self, languages: BTreeMap<String, u64>) -> Self {
        *self.languages.lock() = languages;
        self
    }

    /// Makes calls take long enough to overlap, so concurrency is observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn body_calls(&self) -> usize {
        self.body_calls.load(Ordering::SeqCst)
    }

    /// Paths passed to `fetch_body`, in call order.
    pub fn fetched_paths(&self) -> Vec<String> {
        self.fetched_paths.lock().clone()
    }

    /// Highest number of host calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RepoHost for FakeHost {
    async fn list_entries(
        &self,
        repo: &OwnerRepo,
        path: &str,
    ) -> Result<Vec<TreeEntry>, FetchError> {
        self.enter();
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let result = if let Some(err) = self.list_failures.lock().get(path) {
            Err(err.clone())
        } else {
            let listings = self.listings.lock();
            listings
                .get(&format!("{}:{}", repo, path))
                .or_else(|| listings.get(path))
                .cloned()
                .ok_or_else(|| FetchError::NotFound(path.to_string()))
        };
        self.exit();
        result
    }

    async fn fetch_body(&self, repo: &OwnerRepo, path: &str) -> Result<String, FetchError> {
        self.enter();
        self.body_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_paths.lock().push(path.to_string());
        self.pause().await;
        let result = if let Some(err) = self.body_failures.lock().get(path) {
            Err(err.clone())
        } else {
            let bodies = self.bodies.lock();
            bodies
                .get(&format!("{}:{}", repo, path))
                .or_else(|| bodies.get(path))
                .cloned()
                .ok_or_else(|| FetchError::NotFound(path.to_string()))
        };
        self.exit();
        result
    }

    async fn list_languages(&self, _repo: &OwnerRepo) -> Result<BTreeMap<String, u64>, FetchError> {
        Ok(self.languages.lock().clone())
    }
}
