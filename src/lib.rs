//! Prontuario core library
//!
//! Versioned document store for a clinical-records system, backed by a
//! remote Git-hosted blob store and layered with transparent field-level
//! encryption. The blob host is the sole source of truth; all write safety
//! comes from its version-tag check, with one bounded retry on conflict.

pub mod audit;
pub mod blob;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use audit::{AuditEntry, AuditSink, RequestContext};
pub use blob::{Blob, BlobEntry, BlobHost, GitHubHost};
pub use cipher::FieldCipher;
pub use codec::{decode_record, encode_record, RecordKind};
pub use config::Config;
pub use error::{BlobError, ConfigError, StoreError};
pub use store::{patient_path, slugify, DocumentStore};
