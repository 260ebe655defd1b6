pub mod builder;
pub mod config;
pub mod content;
pub mod github;
pub mod lens;
pub mod normalizer;
pub mod search;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use builder::{BuildStats, BuildWarning, FileTree, TreeBuilder, DEFAULT_FAN_OUT};
pub use config::LensConfig;
pub use content::{ContentFetcher, PrefetchStats, MAX_FILE_SIZE};
pub use github::{GitHubClient, RepoHost};
pub use lens::{LensStats, RepoLens, RepoLensBuilder};
pub use normalizer::{Normalizer, DEFAULT_BATCH_SIZE};
pub use search::{SearchEngine, DEFAULT_TOP_K, DEFAULT_WINDOW_LINES};
pub use storage::{CacheStats, ContentCache, TreeCache};
pub use types::{
    EntryKind, FetchError, LensError, OwnerRepo, Result, SearchWindow, TreeEntry, TreeNode,
};

/// Crate version, mirroring `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
