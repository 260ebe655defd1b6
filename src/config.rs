use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::DEFAULT_FAN_OUT;
use crate::content::MAX_FILE_SIZE;
use crate::github::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::normalizer::DEFAULT_BATCH_SIZE;
use crate::search::{DEFAULT_TOP_K, DEFAULT_WINDOW_LINES};
use crate::storage::DEFAULT_TREE_TTL;
use crate::types::LensError;

/// Crate configuration. Every field has a default, so an empty file (or no
/// file at all) is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub tree: TreeConfig,
    pub content: ContentConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_seconds: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub tree_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tree_ttl_seconds: DEFAULT_TREE_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub fan_out: usize,
    pub batch_size: usize,
    pub max_depth: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            fan_out: DEFAULT_FAN_OUT,
            batch_size: DEFAULT_BATCH_SIZE,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub max_file_size: u64,
    /// Warm the body cache in the background after each tree build.
    pub prefetch: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            prefetch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub window_lines: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            window_lines: DEFAULT_WINDOW_LINES,
        }
    }
}

impl LensConfig {
    pub fn load(path: &Path) -> Result<Self, LensError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LensError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, LensError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| LensError::Config(format!("parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LensError> {
        if self.api.base_url.is_empty() {
            return Err(LensError::Config("api.base_url must not be empty".into()));
        }
        if self.api.timeout_seconds == 0 {
            return Err(LensError::Config("api.timeout_seconds must be >= 1".into()));
        }
        if self.tree.fan_out == 0 {
            return Err(LensError::Config("tree.fan_out must be >= 1".into()));
        }
        if self.tree.batch_size == 0 {
            return Err(LensError::Config("tree.batch_size must be >= 1".into()));
        }
        if self.search.top_k == 0 {
            return Err(LensError::Config("search.top_k must be >= 1".into()));
        }
        if self.search.window_lines == 0 {
            return Err(LensError::Config("search.window_lines must be >= 1".into()));
        }
        Ok(())
    }

    /// Config token if set, `GITHUB_TOKEN` otherwise.
    pub fn resolve_token(&self) -> Option<String> {
        self.api
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    pub fn tree_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.tree_ttl_seconds)
    }
}
