use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::github::RepoHost;
use crate::normalizer::Normalizer;
use crate::storage::{TreeCache, TreeKey};
use crate::types::{sort_siblings, FetchError, LensError, OwnerRepo, TreeEntry, TreeNode};

/// How many directory listings may be in flight at once.
pub const DEFAULT_FAN_OUT: usize = 5;

/// Non-fatal problem hit while expanding a subtree. The directory at `path`
/// rendered as empty instead of aborting the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildWarning {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub directories: usize,
    pub files: usize,
    pub duration_ms: u64,
}

/// A fully expanded tree snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FileTree {
    pub repo: OwnerRepo,
    pub roots: Vec<TreeNode>,
    pub warnings: Vec<BuildWarning>,
    pub stats: BuildStats,
}

impl FileTree {
    /// Depth-first lookup by repository-relative path.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        fn walk<'a>(nodes: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
            for node in nodes {
                if node.path == path {
                    return Some(node);
                }
                if let Some(children) = &node.children {
                    if let Some(found) = walk(children, path) {
                        return Some(found);
                    }
                }
            }
            None
        }
        walk(&self.roots, path)
    }
}

struct Expansion {
    nodes: Vec<TreeNode>,
    warnings: Vec<BuildWarning>,
}

/// Expands a repository into a [`FileTree`], one directory listing at a
/// time, recursively and concurrently.
///
/// Listings go through the tree cache; misses fetch under a semaphore permit
/// that is released before descending into children, so recursion depth can
/// never starve the width gate. A subtree that fails to list becomes an
/// empty directory plus a [`BuildWarning`]; only a root failure aborts.
pub struct TreeBuilder {
    host: Arc<dyn RepoHost>,
    cache: Arc<TreeCache>,
    normalizer: Normalizer,
    gate: Arc<Semaphore>,
    max_depth: Option<usize>,
}

impl TreeBuilder {
    pub fn new(
        host: Arc<dyn RepoHost>,
        cache: Arc<TreeCache>,
        normalizer: Normalizer,
        gate: Arc<Semaphore>,
    ) -> Self {
        Self {
            host,
            cache,
            normalizer,
            gate,
            max_depth: None,
        }
    }

    /// Stops expanding below `depth` levels; deeper directories render empty.
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub async fn build(&self, repo: &OwnerRepo) -> Result<FileTree, LensError> {
        let started = Instant::now();
        debug!(%repo, "building file tree");

        let Expansion {
            nodes,
            mut warnings,
        } = self.expand(repo, String::new(), 0).await?;
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let mut directories = 0;
        let mut files = 0;
        count_nodes(&nodes, &mut directories, &mut files);
        let stats = BuildStats {
            directories,
            files,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            %repo,
            files,
            directories,
            warnings = warnings.len(),
            duration_ms = stats.duration_ms,
            "file tree built"
        );

        Ok(FileTree {
            repo: repo.clone(),
            roots: nodes,
            warnings,
            stats,
        })
    }

    /// One listing, cache-first. The permit covers only the remote call.
    async fn list_cached(
        &self,
        repo: &OwnerRepo,
        path: &str,
    ) -> Result<Vec<TreeEntry>, FetchError> {
        let key = TreeKey::new(repo, path);
        if let Some(entries) = self.cache.get(&key) {
            debug!(path, "listing served from cache");
            return Ok(entries);
        }
        let entries = {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| FetchError::Transient("fetch gate closed".to_string()))?;
            self.host.list_entries(repo, path).await?
        };
        self.cache.put(key, entries.clone());
        Ok(entries)
    }

    fn expand<'a>(
        &'a self,
        repo: &'a OwnerRepo,
        path: String,
        depth: usize,
    ) -> BoxFuture<'a, Result<Expansion, LensError>> {
        async move {
            let entries = self
                .list_cached(repo, &path)
                .await
                .map_err(LensError::Fetch)?;
            let batched = self.normalizer.normalize_batched(entries, repo).await?;
            let mut nodes = batched.collect().await;
            let mut warnings = Vec::new();

            let descend = self.max_depth.map_or(true, |limit| depth + 1 < limit);
            if descend {
                let dir_paths: Vec<String> = nodes
                    .iter()
                    .filter(|n| n.is_dir())
                    .map(|n| n.path.clone())
                    .collect();
                let results = join_all(
                    dir_paths
                        .iter()
                        .map(|p| self.expand(repo, p.clone(), depth + 1)),
                )
                .await;

                let mut children_by_path: HashMap<String, Vec<TreeNode>> = HashMap::new();
                for (dir_path, result) in dir_paths.into_iter().zip(results) {
                    match result {
                        Ok(expansion) => {
                            warnings.extend(expansion.warnings);
                            children_by_path.insert(dir_path, expansion.nodes);
                        }
                        Err(LensError::Fetch(err)) => {
                            warn!(path = %dir_path, error = %err, "subtree listing failed, rendering as empty");
                            warnings.push(BuildWarning {
                                path: dir_path.clone(),
                                message: err.to_string(),
                            });
                            children_by_path.insert(dir_path, Vec::new());
                        }
                        Err(fatal) => return Err(fatal),
                    }
                }

                // Whole-vector swap: a directory is never shown half-filled.
                for node in nodes.iter_mut().filter(|n| n.is_dir()) {
                    node.children = Some(children_by_path.remove(&node.path).unwrap_or_default());
                }
            }

            sort_siblings(&mut nodes);
            Ok(Expansion { nodes, warnings })
        }
        .boxed()
    }
}

fn count_nodes(nodes: &[TreeNode], directories: &mut usize, files: &mut usize) {
    for node in nodes {
        if node.is_dir() {
            *directories += 1;
            if let Some(children) = &node.children {
                count_nodes(children, directories, files);
            }
        } else {
            *files += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::DEFAULT_BATCH_SIZE;
    use crate::test_support::FakeHost;
    use std::time::Duration;

    fn repo() -> OwnerRepo {
        OwnerRepo::new("octo", "demo")
    }

    fn builder_for(host: Arc<FakeHost>) -> TreeBuilder {
        TreeBuilder::new(
            host,
            Arc::new(TreeCache::new()),
            Normalizer::new(DEFAULT_BATCH_SIZE),
            Arc::new(Semaphore::new(DEFAULT_FAN_OUT)),
        )
    }

    fn sample_host() -> FakeHost {
        FakeHost::new()
            .with_dir(
                "",
                vec![
                    TreeEntry::file("zeta.rs", "zeta.rs", 10),
                    TreeEntry::dir("src", "src"),
                    TreeEntry::dir("assets", "assets"),
                    TreeEntry::file("README.md", "README.md", 100),
                ],
            )
            .with_dir(
                "src",
                vec![
                    TreeEntry::file("lib.rs", "src/lib.rs", 50),
                    TreeEntry::dir("sub", "src/sub"),
                ],
            )
            .with_dir("src/sub", vec![TreeEntry::file("deep.rs", "src/sub/deep.rs", 5)])
            .with_dir("assets", vec![TreeEntry::file("logo.png", "assets/logo.png", 2048)])
    }

    #[tokio::test]
    async fn test_builds_sorted_tree() {
        let tree = builder_for(Arc::new(sample_host()))
            .build(&repo())
            .await
            .unwrap();

        let names: Vec<&str> = tree.roots.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["assets", "src", "README.md", "zeta.rs"]);

        let src = tree.find("src").unwrap();
        let children = src.children.as_ref().unwrap();
        let child_names: Vec<&str> = children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(child_names, vec!["sub", "lib.rs"]);

        assert!(tree.warnings.is_empty());
        assert_eq!(tree.stats.files, 5);
        assert_eq!(tree.stats.directories, 3);
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic_and_cached() {
        let host = Arc::new(sample_host());
        let builder = builder_for(host.clone());

        let first = builder.build(&repo()).await.unwrap();
        let listings_after_first = host.list_calls();
        let second = builder.build(&repo()).await.unwrap();

        assert_eq!(first.roots, second.roots);
        // Second build is served entirely from the listing cache.
        assert_eq!(host.list_calls(), listings_after_first);
    }

    #[tokio::test]
    async fn test_listing_order_does_not_affect_tree() {
        let forward = builder_for(Arc::new(sample_host()))
            .build(&repo())
            .await
            .unwrap();

        let mut reversed_root = vec![
            TreeEntry::file("zeta.rs", "zeta.rs", 10),
            TreeEntry::dir("src", "src"),
            TreeEntry::dir("assets", "assets"),
            TreeEntry::file("README.md", "README.md", 100),
        ];
        reversed_root.reverse();
        let host = sample_host().with_dir("", reversed_root);
        let reversed = builder_for(Arc::new(host)).build(&repo()).await.unwrap();

        assert_eq!(forward.roots, reversed.roots);
    }

    #[tokio::test]
    async fn test_failed_subtree_becomes_empty_with_warning() {
        let host = sample_host().with_list_failure("src/sub", FetchError::RateLimited);
        let tree = builder_for(Arc::new(host)).build(&repo()).await.unwrap();

        let sub = tree.find("src/sub").unwrap();
        assert_eq!(sub.children, Some(Vec::new()));

        assert_eq!(tree.warnings.len(), 1);
        assert_eq!(tree.warnings[0].path, "src/sub");
        assert!(tree.warnings[0].message.contains("rate limited"));

        // The rest of the tree is intact.
        assert!(tree.find("src/lib.rs").is_some());
        assert!(tree.find("assets/logo.png").is_some());
    }

    #[tokio::test]
    async fn test_root_failure_aborts_build() {
        let host = FakeHost::new().with_list_failure("", FetchError::NotFound("".to_string()));
        let err = builder_for(Arc::new(host)).build(&repo()).await.unwrap_err();
        assert!(matches!(err, LensError::Fetch(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let mut host = FakeHost::new().with_dir(
            "",
            (0..20)
                .map(|i| TreeEntry::dir(format!("d{:02}", i), format!("d{:02}", i)))
                .collect(),
        );
        for i in 0..20 {
            host = host.with_dir(
                &format!("d{:02}", i),
                vec![TreeEntry::file("f.rs", format!("d{:02}/f.rs", i), 1)],
            );
        }
        let host = Arc::new(host.with_delay(Duration::from_millis(5)));
        builder_for(host.clone()).build(&repo()).await.unwrap();

        assert!(host.max_in_flight() <= DEFAULT_FAN_OUT);
        assert!(host.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_max_depth_stops_descent() {
        let host = Arc::new(sample_host());
        let builder = builder_for(host.clone()).with_max_depth(Some(1));
        let tree = builder.build(&repo()).await.unwrap();

        assert_eq!(host.list_calls(), 1);
        let src = tree.find("src").unwrap();
        assert_eq!(src.children, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_warnings_are_sorted_by_path() {
        let host = sample_host()
            .with_list_failure("src", FetchError::Transient("503".to_string()))
            .with_list_failure("assets", FetchError::RateLimited);
        let tree = builder_for(Arc::new(host)).build(&repo()).await.unwrap();

        let paths: Vec<&str> = tree.warnings.iter().map(|w| w.path.as_str()).collect();
        assert_eq!(paths, vec!["assets", "src"]);
    }
}
