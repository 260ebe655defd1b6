use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::types::{EntryKind, FetchError, OwnerRepo, TreeEntry};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("repolens/", env!("CARGO_PKG_VERSION"));

/// Remote host repositories are browsed through. `GitHubClient` is the
/// production implementation; tests swap in scripted hosts.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Lists one directory level. `path` is repository-relative;
    /// empty string means the root.
    async fn list_entries(&self, repo: &OwnerRepo, path: &str)
        -> Result<Vec<TreeEntry>, FetchError>;

    /// Fetches one file body as UTF-8 text.
    async fn fetch_body(&self, repo: &OwnerRepo, path: &str) -> Result<String, FetchError>;

    /// Language name to byte count, as reported by the host.
    async fn list_languages(&self, repo: &OwnerRepo) -> Result<BTreeMap<String, u64>, FetchError>;
}

/// GitHub contents API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self, reqwest::Error> {
        Self::with_base_url(DEFAULT_BASE_URL, token, DEFAULT_TIMEOUT)
    }

    /// `base_url` override is for self-hosted instances and tests.
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn contents_url(&self, repo: &OwnerRepo, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{}/repos/{}/{}/contents", self.base_url, repo.owner, repo.repo)
        } else {
            format!(
                "{}/repos/{}/{}/contents/{}",
                self.base_url, repo.owner, repo.repo, path
            )
        }
    }

    async fn get_checked(&self, url: &str) -> Result<Response, FetchError> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        check_status(response)
    }
}

fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let path = response.url().path().to_string();
    match status {
        StatusCode::NOT_FOUND => Err(FetchError::NotFound(path)),
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
        // GitHub signals quota exhaustion as 403 with the remaining counter
        // at zero; any other 403 means the path is inaccessible to us.
        StatusCode::FORBIDDEN if rate_exhausted(response.headers()) => Err(FetchError::RateLimited),
        StatusCode::FORBIDDEN => Err(FetchError::NotFound(path)),
        s if s.is_server_error() => Err(FetchError::Transient(format!("host returned {}", s))),
        s => Err(FetchError::Transient(format!("unexpected status {}", s))),
    }
}

fn rate_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        == Some("0")
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
    sha: Option<String>,
}

fn convert_entry(raw: RawEntry) -> Option<TreeEntry> {
    let kind = match raw.kind.as_str() {
        "file" => EntryKind::File,
        "dir" => EntryKind::Directory,
        other => {
            debug!(path = %raw.path, kind = other, "skipping unsupported entry kind");
            return None;
        }
    };
    Some(TreeEntry {
        name: raw.name,
        path: raw.path,
        size: match kind {
            EntryKind::File => raw.size,
            EntryKind::Directory => None,
        },
        kind,
        sha: raw.sha,
    })
}

#[derive(Debug, Deserialize)]
struct RawBlob {
    content: Option<String>,
    encoding: Option<String>,
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn list_entries(
        &self,
        repo: &OwnerRepo,
        path: &str,
    ) -> Result<Vec<TreeEntry>, FetchError> {
        let url = self.contents_url(repo, path);
        debug!(%repo, path, "listing directory");
        let response = self.get_checked(&url).await?;
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

        // A directory lists as an array; asking for a file path yields a
        // single object, which we fold into a one-entry listing.
        let raw: Vec<RawEntry> = if payload.is_array() {
            serde_json::from_value(payload)
                .map_err(|e| FetchError::MalformedResponse(e.to_string()))?
        } else if payload.is_object() {
            vec![serde_json::from_value(payload)
                .map_err(|e| FetchError::MalformedResponse(e.to_string()))?]
        } else {
            return Err(FetchError::MalformedResponse(
                "listing is neither array nor object".to_string(),
            ));
        };

        Ok(raw.into_iter().filter_map(convert_entry).collect())
    }

    async fn fetch_body(&self, repo: &OwnerRepo, path: &str) -> Result<String, FetchError> {
        let url = self.contents_url(repo, path);
        debug!(%repo, path, "fetching file body");
        let response = self.get_checked(&url).await?;
        let blob: RawBlob = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

        match blob.encoding.as_deref() {
            Some("base64") => {}
            // "none" marks blobs too large for inline content.
            Some("none") => return Err(FetchError::UnsupportedContent(path.to_string())),
            Some(other) => {
                return Err(FetchError::MalformedResponse(format!(
                    "unexpected blob encoding: {}",
                    other
                )))
            }
            None => {
                return Err(FetchError::MalformedResponse(format!(
                    "missing encoding for {}",
                    path
                )))
            }
        }

        let encoded = blob.content.ok_or_else(|| {
            FetchError::MalformedResponse(format!("missing inline content for {}", path))
        })?;
        // The API wraps base64 payloads with newlines every 60 chars.
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| FetchError::MalformedResponse(format!("base64 decode: {}", e)))?;
        String::from_utf8(bytes).map_err(|_| FetchError::UnsupportedContent(path.to_string()))
    }

    async fn list_languages(&self, repo: &OwnerRepo) -> Result<BTreeMap<String, u64>, FetchError> {
        let url = format!(
            "{}/repos/{}/{}/languages",
            self.base_url, repo.owner, repo.repo
        );
        debug!(%repo, "fetching language breakdown");
        let response = self.get_checked(&url).await?;
        response
            .json::<BTreeMap<String, u64>>()
            .await
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}
