//! Versioned blob host client.
//!
//! [`BlobHost`] is the seam between the document store and the concrete
//! hosting API: a path-addressed object store where every update or delete
//! must carry the version tag of the content it is based on. [`GitHubHost`]
//! implements it against the GitHub contents API, where the version tag is
//! the blob `sha` and content travels base64-encoded.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::error::BlobError;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
const USER_AGENT_HEADER: &str = "prontuario-core";

/// Stored content plus the version tag identifying it.
#[derive(Debug, Clone)]
pub struct Blob {
    pub content: Vec<u8>,
    pub version: String,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A remote path-addressed object host with optimistic-concurrency writes.
#[async_trait]
pub trait BlobHost: Send + Sync {
    /// Fetches the content and version tag at `path`.
    async fn get(&self, path: &str) -> Result<Blob, BlobError>;

    /// Conditionally writes `content` at `path`. `version` must be the tag
    /// of the currently stored content, or `None` when creating a new path;
    /// a mismatch fails with [`BlobError::Conflict`].
    async fn put(
        &self,
        path: &str,
        content: &[u8],
        version: Option<&str>,
        message: &str,
    ) -> Result<(), BlobError>;

    /// Deletes the content at `path`, conditional on `version`.
    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), BlobError>;

    /// Lists the regular files in `folder`. A missing folder is an empty
    /// listing, never an error.
    async fn list(&self, folder: &str) -> Result<Vec<BlobEntry>, BlobError>;

    /// Resolves the current version tag of `path`, or `None` when the path
    /// does not exist. Used as the read-before-write step of every save.
    async fn resolve_version(&self, path: &str) -> Result<Option<String>, BlobError> {
        match self.get(path).await {
            Ok(blob) => Ok(Some(blob.version)),
            Err(BlobError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

/// [`BlobHost`] backed by the GitHub contents API.
pub struct GitHubHost {
    client: Client,
    base_url: String,
    repo: String,
    branch: String,
    token: String,
}

impl GitHubHost {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(DEFAULT_API_BASE, config)
    }

    /// Points the client at a different API base. Used by tests to target a
    /// local mock server.
    pub fn with_base_url(base_url: impl Into<String>, config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.base_url, self.repo, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT_HEADER)
            .header("User-Agent", USER_AGENT_HEADER)
    }
}

async fn host_error(response: Response) -> BlobError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BlobError::Host { status, body }
}

#[async_trait]
impl BlobHost for GitHubHost {
    async fn get(&self, path: &str) -> Result<Blob, BlobError> {
        let response = self
            .request(self.client.get(self.contents_url(path)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(BlobError::NotFound),
            status if status.is_success() => {
                let body: ContentsResponse = response.json().await?;
                // The API wraps base64 content with newlines.
                let encoded: String = body
                    .content
                    .unwrap_or_default()
                    .split_whitespace()
                    .collect();
                let content = BASE64.decode(encoded.as_bytes())?;
                debug!(path, version = %body.sha, "blob fetched");
                Ok(Blob {
                    content,
                    version: body.sha,
                })
            }
            _ => Err(host_error(response).await),
        }
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        version: Option<&str>,
        message: &str,
    ) -> Result<(), BlobError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": self.branch,
        });
        if let Some(version) = version {
            body["sha"] = json!(version);
        }
        let response = self
            .request(self.client.put(self.contents_url(path)))
            .json(&body)
            .send()
            .await?;
        match response.status() {
            StatusCode::CONFLICT => Err(BlobError::Conflict),
            status if status.is_success() => {
                debug!(path, "blob written");
                Ok(())
            }
            _ => Err(host_error(response).await),
        }
    }

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), BlobError> {
        let body = json!({
            "message": message,
            "sha": version,
            "branch": self.branch,
        });
        let response = self
            .request(self.client.delete(self.contents_url(path)))
            .json(&body)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(BlobError::NotFound),
            StatusCode::CONFLICT => Err(BlobError::Conflict),
            status if status.is_success() => {
                debug!(path, "blob deleted");
                Ok(())
            }
            _ => Err(host_error(response).await),
        }
    }

    async fn list(&self, folder: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let response = self
            .request(self.client.get(self.contents_url(folder)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let entries: Vec<BlobEntry> = response.json().await?;
                Ok(entries.into_iter().filter(|e| e.kind == "file").collect())
            }
            _ => Err(host_error(response).await),
        }
    }
}
