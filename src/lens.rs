//! Public facade: one handle owning the caches, the tree builder, the
//! content fetcher and the search engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::builder::{FileTree, TreeBuilder};
use crate::config::LensConfig;
use crate::content::{ContentFetcher, PrefetchStats};
use crate::github::{GitHubClient, RepoHost};
use crate::normalizer::Normalizer;
use crate::search::SearchEngine;
use crate::storage::{CacheStats, ContentCache, TreeCache};
use crate::types::{LensError, OwnerRepo, Result, SearchWindow};

/// Session diagnostics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LensStats {
    pub repo: Option<OwnerRepo>,
    pub tree_cache: CacheStats,
    pub content_cache: CacheStats,
    pub last_built: Option<DateTime<Utc>>,
}

/// Repository browsing session.
///
/// ```no_run
/// # async fn example() -> repolens::Result<()> {
/// let lens = repolens::RepoLens::builder()
///     .github_token("ghp_...")
///     .build()?;
/// let tree = lens.build_file_tree("rust-lang", "cargo").await?;
/// println!("{} files", tree.stats.files);
/// let body = lens.get_file_content("src/cargo/lib.rs").await?;
/// let hits = lens.search_files("workspace resolver");
/// # Ok(())
/// # }
/// ```
pub struct RepoLens {
    host: Arc<dyn RepoHost>,
    tree_cache: Arc<TreeCache>,
    content_cache: Arc<ContentCache>,
    builder: TreeBuilder,
    fetcher: Arc<ContentFetcher>,
    search: SearchEngine,
    active: RwLock<Option<OwnerRepo>>,
    last_built: RwLock<Option<DateTime<Utc>>>,
    prefetch: bool,
}

impl RepoLens {
    pub fn builder() -> RepoLensBuilder {
        RepoLensBuilder::new()
    }

    /// Discovers the full file tree of `owner/repo` and makes it the active
    /// repository for content and search calls. Switching to a different
    /// repository drops the previous session's cached bodies.
    pub async fn build_file_tree(&self, owner: &str, repo: &str) -> Result<FileTree> {
        let repo = OwnerRepo::new(owner, repo);
        if !repo.is_well_formed() {
            return Err(LensError::InvalidRepo(repo.to_string()));
        }
        info!(%repo, "building repository file tree");
        let tree = self.builder.build(&repo).await?;

        let switching = self
            .active
            .read()
            .as_ref()
            .is_some_and(|current| *current != repo);
        if switching {
            debug!(%repo, "switching repository, dropping session content cache");
            self.content_cache.clear();
        }
        *self.active.write() = Some(repo.clone());
        *self.last_built.write() = Some(Utc::now());
        self.fetcher.register_tree(&tree);

        if self.prefetch {
            let fetcher = Arc::clone(&self.fetcher);
            let repo = repo.clone();
            tokio::spawn(async move {
                let stats = fetcher.prefetch(&repo).await;
                debug!(
                    %repo,
                    fetched = stats.fetched,
                    failed = stats.failed,
                    "background prefetch finished"
                );
            });
        }
        Ok(tree)
    }

    /// Body of one file in the active repository. `Ok(None)` when the file
    /// is filtered from preview (media extension, declared size over the
    /// limit, or no text rendering).
    pub async fn get_file_content(&self, path: &str) -> Result<Option<String>> {
        let repo = self.active_repository().ok_or(LensError::NoRepository)?;
        self.fetcher.get_body(&repo, path).await
    }

    /// Keyword search over the bodies cached so far. Purely in-memory;
    /// never fetches.
    pub fn search_files(&self, query: &str) -> Vec<SearchWindow> {
        self.search.search(query)
    }

    /// Language breakdown of the active repository, straight from the host.
    pub async fn repository_languages(&self) -> Result<BTreeMap<String, u64>> {
        let repo = self.active_repository().ok_or(LensError::NoRepository)?;
        self.host
            .list_languages(&repo)
            .await
            .map_err(LensError::Fetch)
    }

    /// Foreground warm-up of the body cache for the active repository.
    pub async fn prefetch_contents(&self) -> Result<PrefetchStats> {
        let repo = self.active_repository().ok_or(LensError::NoRepository)?;
        Ok(self.fetcher.prefetch(&repo).await)
    }

    pub fn active_repository(&self) -> Option<OwnerRepo> {
        self.active.read().clone()
    }

    pub fn stats(&self) -> LensStats {
        LensStats {
            repo: self.active_repository(),
            tree_cache: self.tree_cache.stats(),
            content_cache: self.content_cache.stats(),
            last_built: *self.last_built.read(),
        }
    }

    /// Drops cached listings and bodies. The active repository stays
    /// active; subsequent calls refetch.
    pub fn clear_caches(&self) {
        self.tree_cache.clear();
        self.content_cache.clear();
        debug!("caches cleared");
    }
}

/// Builder for [`RepoLens`]. Construction is synchronous and runtime-free;
/// worker tasks spawn lazily on first use.
pub struct RepoLensBuilder {
    config: LensConfig,
    host: Option<Arc<dyn RepoHost>>,
}

impl Default for RepoLensBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoLensBuilder {
    pub fn new() -> Self {
        Self {
            config: LensConfig::default(),
            host: None,
        }
    }

    /// Seeds every knob from a loaded configuration.
    pub fn with_config(mut self, config: LensConfig) -> Self {
        self.config = config;
        self
    }

    pub fn github_token(mut self, token: impl Into<String>) -> Self {
        self.config.api.token = Some(token.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.api.timeout_seconds = seconds;
        self
    }

    /// Listing cache TTL in seconds.
    pub fn cache_ttl(mut self, seconds: u64) -> Self {
        self.config.cache.tree_ttl_seconds = seconds;
        self
    }

    /// Concurrent listing/fetch width.
    pub fn fan_out(mut self, width: usize) -> Self {
        self.config.tree.fan_out = width;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.tree.batch_size = size;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.tree.max_depth = Some(depth);
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.content.max_file_size = bytes;
        self
    }

    /// Whether a successful tree build kicks off a detached cache warm-up.
    pub fn prefetch_content(mut self, enabled: bool) -> Self {
        self.config.content.prefetch = enabled;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.search.top_k = k;
        self
    }

    pub fn window_lines(mut self, lines: usize) -> Self {
        self.config.search.window_lines = lines;
        self
    }

    /// Custom host implementation, for tests and self-hosted forges.
    pub fn with_host(mut self, host: Arc<dyn RepoHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self) -> Result<RepoLens> {
        self.config.validate()?;

        let host: Arc<dyn RepoHost> = match self.host {
            Some(host) => host,
            None => {
                let client = GitHubClient::with_base_url(
                    self.config.api.base_url.clone(),
                    self.config.resolve_token(),
                    self.config.timeout(),
                )
                .map_err(|e| LensError::Config(format!("http client: {}", e)))?;
                Arc::new(client)
            }
        };

        let tree_cache = Arc::new(TreeCache::with_ttl(self.config.tree_ttl()));
        let content_cache = Arc::new(ContentCache::new());
        // One gate for listings and body fetches alike: the limit protects
        // the host, not any single component.
        let gate = Arc::new(Semaphore::new(self.config.tree.fan_out));

        let builder = TreeBuilder::new(
            Arc::clone(&host),
            Arc::clone(&tree_cache),
            Normalizer::new(self.config.tree.batch_size),
            Arc::clone(&gate),
        )
        .with_max_depth(self.config.tree.max_depth);

        let fetcher = Arc::new(
            ContentFetcher::new(Arc::clone(&host), Arc::clone(&content_cache), gate)
                .with_max_file_size(self.config.content.max_file_size),
        );

        let search = SearchEngine::with_limits(
            Arc::clone(&content_cache),
            self.config.search.top_k,
            self.config.search.window_lines,
        );

        Ok(RepoLens {
            host,
            tree_cache,
            content_cache,
            builder,
            fetcher,
            search,
            active: RwLock::new(None),
            last_built: RwLock::new(None),
            prefetch: self.config.content.prefetch,
        })
    }
}
