use thiserror::Error;

/// Failures reported while talking to the hosting API.
///
/// `NotFound` on a subtree is non-fatal (the directory renders empty);
/// everything is fatal when it hits the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by the hosting API")]
    RateLimited,

    #[error("transient host failure: {0}")]
    Transient(String),

    #[error("malformed host response: {0}")]
    MalformedResponse(String),

    /// The blob exists but cannot be previewed as text.
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),
}

impl FetchError {
    /// Whether a retry could plausibly succeed without anything changing
    /// on the remote side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited | FetchError::Transient(_) | FetchError::MalformedResponse(_)
        )
    }
}

/// Library-level errors surfaced by [`crate::RepoLens`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LensError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid repository identifier: {0}")]
    InvalidRepo(String),

    #[error("no repository loaded; build a file tree first")]
    NoRepository,

    #[error("normalizer workers are no longer running")]
    WorkerClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LensError>;
