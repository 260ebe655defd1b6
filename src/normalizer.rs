//! Converts raw listing rows into canonical tree nodes.
//!
//! Normalization is cheap per entry, so it runs in batches: callers hand a
//! whole listing to [`Normalizer`], which chunks it and feeds a small worker
//! pool over a channel. The first batch comes back eagerly so interactive
//! callers can render something; the rest arrive in completion order.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, OnceCell};
use tracing::debug;

use crate::types::{EntryKind, LensError, OwnerRepo, TreeEntry, TreeNode};

pub const DEFAULT_BATCH_SIZE: usize = 100;

const WORKER_COUNT: usize = 2;
const INBOX_DEPTH: usize = 32;

/// One batch of raw entries to normalize, with a reply slot. Dropping the
/// receiving end is how a caller abandons the batch; the worker notices and
/// discards the result.
#[derive(Debug)]
pub struct NormalizeRequest {
    pub entries: Vec<TreeEntry>,
    pub repo: OwnerRepo,
    pub reply: oneshot::Sender<NormalizeResponse>,
}

#[derive(Debug)]
pub struct NormalizeResponse {
    pub nodes: Vec<TreeNode>,
}

/// Handle to the normalization worker pool.
///
/// Workers spawn lazily on first use, so a `Normalizer` can be constructed
/// outside a tokio runtime.
pub struct Normalizer {
    inbox: OnceCell<mpsc::Sender<NormalizeRequest>>,
    batch_size: usize,
}

impl Normalizer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            inbox: OnceCell::new(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn sender(&self) -> &mpsc::Sender<NormalizeRequest> {
        self.inbox.get_or_init(|| async { spawn_workers() }).await
    }

    /// Normalizes `entries` as a single batch.
    pub async fn normalize(
        &self,
        entries: Vec<TreeEntry>,
        repo: &OwnerRepo,
    ) -> Result<Vec<TreeNode>, LensError> {
        let (reply, rx) = oneshot::channel();
        let request = NormalizeRequest {
            entries,
            repo: repo.clone(),
            reply,
        };
        self.sender()
            .await
            .send(request)
            .await
            .map_err(|_| LensError::WorkerClosed)?;
        let response = rx.await.map_err(|_| LensError::WorkerClosed)?;
        Ok(response.nodes)
    }

    /// Chunks `entries` by the configured batch size and enqueues every
    /// chunk. The first batch is awaited before returning; the remainder
    /// stream out of [`BatchedNormalize`] as workers finish them.
    pub async fn normalize_batched(
        &self,
        entries: Vec<TreeEntry>,
        repo: &OwnerRepo,
    ) -> Result<BatchedNormalize, LensError> {
        if entries.is_empty() {
            return Ok(BatchedNormalize {
                first: Vec::new(),
                pending: FuturesUnordered::new(),
            });
        }

        let sender = self.sender().await;
        let mut receivers = Vec::new();
        for chunk in entries.chunks(self.batch_size) {
            let (reply, rx) = oneshot::channel();
            let request = NormalizeRequest {
                entries: chunk.to_vec(),
                repo: repo.clone(),
                reply,
            };
            sender
                .send(request)
                .await
                .map_err(|_| LensError::WorkerClosed)?;
            receivers.push(rx);
        }

        let mut receivers = receivers.into_iter();
        let first = match receivers.next() {
            Some(rx) => rx.await.map_err(|_| LensError::WorkerClosed)?.nodes,
            None => Vec::new(),
        };
        Ok(BatchedNormalize {
            first,
            pending: receivers.collect(),
        })
    }
}

/// In-flight batched normalization: the eagerly normalized first batch plus
/// the remaining batches in worker completion order.
pub struct BatchedNormalize {
    first: Vec<TreeNode>,
    pending: FuturesUnordered<oneshot::Receiver<NormalizeResponse>>,
}

impl BatchedNormalize {
    pub fn first(&self) -> &[TreeNode] {
        &self.first
    }

    /// Next completed batch, or `None` once all batches have arrived.
    pub async fn next_batch(&mut self) -> Option<Vec<TreeNode>> {
        while let Some(result) = self.pending.next().await {
            match result {
                Ok(response) => return Some(response.nodes),
                // Worker dropped the reply; nothing to surface.
                Err(_) => continue,
            }
        }
        None
    }

    /// Drains every remaining batch, appending in arrival order.
    pub async fn collect(mut self) -> Vec<TreeNode> {
        let mut nodes = std::mem::take(&mut self.first);
        while let Some(batch) = self.next_batch().await {
            nodes.extend(batch);
        }
        nodes
    }
}

fn spawn_workers() -> mpsc::Sender<NormalizeRequest> {
    let (tx, rx) = mpsc::channel(INBOX_DEPTH);
    let rx = Arc::new(AsyncMutex::new(rx));
    for id in 0..WORKER_COUNT {
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            loop {
                let request = { rx.lock().await.recv().await };
                let Some(NormalizeRequest {
                    entries,
                    repo,
                    reply,
                }) = request
                else {
                    debug!(worker = id, "normalizer inbox closed");
                    return;
                };
                let nodes = normalize_entries(&entries, &repo);
                if reply.send(NormalizeResponse { nodes }).is_err() {
                    debug!(worker = id, "discarding batch for dropped caller");
                }
            }
        });
    }
    tx
}

/// Raw entry to canonical node. Directories get an empty-children
/// placeholder that the tree builder later swaps for the real subtree.
pub fn normalize_entry(entry: &TreeEntry, repo: &OwnerRepo) -> TreeNode {
    TreeNode {
        name: entry.name.clone(),
        path: entry.path.clone(),
        kind: entry.kind,
        size: match entry.kind {
            EntryKind::File => entry.size,
            EntryKind::Directory => None,
        },
        last_modified: None,
        language: match entry.kind {
            EntryKind::File => language_from_extension(&entry.name),
            EntryKind::Directory => None,
        },
        children: match entry.kind {
            EntryKind::Directory => Some(Vec::new()),
            EntryKind::File => None,
        },
        repo: repo.clone(),
    }
}

pub fn normalize_entries(entries: &[TreeEntry], repo: &OwnerRepo) -> Vec<TreeNode> {
    entries
        .iter()
        .map(|entry| normalize_entry(entry, repo))
        .collect()
}

/// Best-effort language tag from the file extension.
pub fn language_from_extension(name: &str) -> Option<String> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let language = match ext.as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hh" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "sh" | "bash" => "shell",
        "md" => "markdown",
        "json" => "json",
        "toml" => "toml",
        "yml" | "yaml" => "yaml",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => return None,
    };
    Some(language.to_string())
}
