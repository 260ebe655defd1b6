use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::builder::FileTree;
use crate::github::RepoHost;
use crate::storage::ContentCache;
use crate::types::{for_each_file, FetchError, LensError, OwnerRepo};

/// Files declaring a size above this are never fetched for preview.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Extensions with no useful text preview. Lowercase.
static IGNORED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // images
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tiff",
        // audio and video
        "mp3", "mp4", "wav", "ogg", "flac", "avi", "mov", "webm", "mkv",
        // archives
        "zip", "tar", "gz", "bz2", "xz", "7z", "rar",
        // documents
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
        // fonts
        "ttf", "otf", "woff", "woff2", "eot",
        // binaries and build output
        "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "jar", "pyc", "wasm",
        // databases
        "db", "sqlite",
    ]
    .into_iter()
    .collect()
});

pub fn is_ignored_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            IGNORED_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

/// Outcome of one warm-up pass. `skipped` covers filtered and already
/// cached files alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchStats {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Manifest {
    // declared size per file path; None when the host did not report one
    sizes: HashMap<String, Option<u64>>,
    // file paths in tree (depth-first) order
    order: Vec<String>,
    // bumped on every register/clear; in-flight fetches started against an
    // older generation must not cache into the current session
    generation: u64,
}

/// Read-through file body fetcher.
///
/// Two filters run before any network call: ignored extensions, and the
/// size the file declared in the last built tree. A filtered file yields
/// `None` rather than an error, and nothing negative is ever cached, so a
/// file that shrinks below the limit on the remote side is fetchable after
/// the next tree build.
pub struct ContentFetcher {
    host: Arc<dyn RepoHost>,
    cache: Arc<ContentCache>,
    gate: Arc<Semaphore>,
    manifest: RwLock<Manifest>,
    max_file_size: u64,
}

impl ContentFetcher {
    pub fn new(host: Arc<dyn RepoHost>, cache: Arc<ContentCache>, gate: Arc<Semaphore>) -> Self {
        Self {
            host,
            cache,
            gate,
            manifest: RwLock::new(Manifest::default()),
            max_file_size: MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Records the files (and declared sizes) of a freshly built tree.
    /// Replaces whatever the previous tree registered; fetches still in
    /// flight against the old tree will see the generation change and drop
    /// their results instead of caching into the new session.
    pub fn register_tree(&self, tree: &FileTree) {
        let mut current = self.manifest.write();
        let mut manifest = Manifest {
            generation: current.generation + 1,
            ..Manifest::default()
        };
        for_each_file(&tree.roots, &mut |node| {
            manifest.order.push(node.path.clone());
            manifest.sizes.insert(node.path.clone(), node.size);
        });
        debug!(
            files = manifest.order.len(),
            generation = manifest.generation,
            "registered content manifest"
        );
        *current = manifest;
    }

    pub fn clear_manifest(&self) {
        let mut current = self.manifest.write();
        let generation = current.generation + 1;
        *current = Manifest {
            generation,
            ..Manifest::default()
        };
    }

    fn generation(&self) -> u64 {
        self.manifest.read().generation
    }

    fn skip_reason(&self, path: &str) -> Option<&'static str> {
        let manifest = self.manifest.read();
        self.skip_reason_in(&manifest, path)
    }

    // Takes the manifest by reference so callers already holding the read
    // guard do not re-lock it.
    fn skip_reason_in(&self, manifest: &Manifest, path: &str) -> Option<&'static str> {
        if is_ignored_extension(path) {
            return Some("ignored extension");
        }
        if let Some(Some(size)) = manifest.sizes.get(path) {
            if *size > self.max_file_size {
                return Some("declared size over limit");
            }
        }
        None
    }

    /// Cached body, or a read-through fetch. `Ok(None)` means the file is
    /// filtered from preview or its blob has no text rendering.
    pub async fn get_body(
        &self,
        repo: &OwnerRepo,
        path: &str,
    ) -> Result<Option<String>, LensError> {
        if let Some(text) = self.cache.get(path) {
            return Ok(Some(text));
        }
        if let Some(reason) = self.skip_reason(path) {
            debug!(path, reason, "skipping content fetch");
            return Ok(None);
        }
        match self.fetch_and_cache(repo, path).await {
            Ok(text) => Ok(Some(text)),
            Err(FetchError::UnsupportedContent(_)) => {
                debug!(path, "blob has no text preview");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_and_cache(&self, repo: &OwnerRepo, path: &str) -> Result<String, FetchError> {
        let generation = self.generation();
        let text = {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| FetchError::Transient("fetch gate closed".to_string()))?;
            self.host.fetch_body(repo, path).await?
        };
        // The session may have moved to another tree while we were waiting;
        // the caller still gets the body, the new session's cache does not.
        if self.generation() == generation {
            self.cache.insert(path, text.clone());
        } else {
            debug!(path, "fetched body belongs to a superseded tree, not caching");
        }
        Ok(text)
    }

    /// Best-effort warm-up of every eligible file in the registered
    /// manifest. Fetches run concurrently under the shared gate; bodies are
    /// inserted afterwards in manifest order, keeping cache order (and with
    /// it search tie-breaking) independent of network timing. Per-file
    /// failures are logged and counted, never raised.
    pub async fn prefetch(&self, repo: &OwnerRepo) -> PrefetchStats {
        let (plan, skipped, generation) = {
            let manifest = self.manifest.read();
            let mut plan = Vec::new();
            let mut skipped = 0usize;
            for path in &manifest.order {
                if self.cache.contains(path) || self.skip_reason_in(&manifest, path).is_some() {
                    skipped += 1;
                } else {
                    plan.push(path.clone());
                }
            }
            (plan, skipped, manifest.generation)
        };

        let results = join_all(plan.into_iter().map(|path| async move {
            let result = {
                match self.gate.acquire().await {
                    Ok(_permit) => self.host.fetch_body(repo, &path).await,
                    Err(_) => Err(FetchError::Transient("fetch gate closed".to_string())),
                }
            };
            (path, result)
        }))
        .await;

        let mut stats = PrefetchStats {
            skipped,
            ..Default::default()
        };
        for (path, result) in results {
            // Re-checked per insert: a new tree registered mid-loop owns the
            // cache from that point on.
            if self.generation() != generation {
                debug!(path = %path, "discarding prefetch result for a superseded tree");
                stats.skipped += 1;
                continue;
            }
            match result {
                Ok(text) => {
                    self.cache.insert(path, text);
                    stats.fetched += 1;
                }
                Err(FetchError::UnsupportedContent(_)) => {
                    debug!(path = %path, "prefetch skipped binary blob");
                    stats.skipped += 1;
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "prefetch failed");
                    stats.failed += 1;
                }
            }
        }
        debug!(
            fetched = stats.fetched,
            skipped = stats.skipped,
            failed = stats.failed,
            "prefetch pass complete"
        );
        stats
    }
}
