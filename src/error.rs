//! Error taxonomy for the document store core.
//!
//! `NotFound` is recoverable (loads fall back to empty defaults),
//! `WriteConflict` is surfaced only after the bounded retry, and everything
//! else propagates unchanged to the caller.

use thiserror::Error;

/// Errors from the versioned blob host.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The path does not exist on the host.
    #[error("blob not found")]
    NotFound,

    /// The supplied version tag no longer matches the stored content.
    #[error("version conflict: stored content changed since it was read")]
    Conflict,

    /// The host answered with an unexpected status.
    #[error("host rejected request ({status}): {body}")]
    Host { status: u16, body: String },

    /// Network-level failure reaching the host.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The host returned content that is not valid base64.
    #[error("content encoding failure: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Errors surfaced by [`crate::store::DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document does not exist and the operation requires it to.
    #[error("document not found")]
    NotFound,

    /// Both write attempts hit a version conflict. The caller decides
    /// whether to re-read and try again or abort.
    #[error("write conflict persisted after retry")]
    WriteConflict,

    /// The document could not be serialized or deserialized.
    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    /// Any other blob host failure, propagated unchanged.
    #[error("blob host failure: {0}")]
    Blob(BlobError),
}

impl From<BlobError> for StoreError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound => StoreError::NotFound,
            other => StoreError::Blob(other),
        }
    }
}

/// Startup configuration failures. Both are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GITHUB_TOKEN is not set; the blob host credential is required")]
    MissingToken,

    #[error("ENCRYPTION_KEY is not set; refusing to start without a field encryption key")]
    MissingEncryptionKey,
}
