//! Typed document operations over the versioned blob host.
//!
//! Documents are whole JSON values, one per path. Writes are optimistic:
//! the current version tag is fetched immediately before each attempt, a
//! conflict gets one fixed-backoff retry, and a second conflict surfaces as
//! [`StoreError::WriteConflict`]. No merge is ever attempted, so two
//! read-modify-write callers far enough apart in time can still lose an
//! update without any conflict being reported; that window is accepted.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::blob::{BlobEntry, BlobHost};
use crate::cipher::FieldCipher;
use crate::codec::{self, RecordKind};
use crate::error::{BlobError, StoreError};

/// Users list, one document for all accounts.
pub const USERS_PATH: &str = "usuarios.json";
/// Audit log document.
pub const LOGS_PATH: &str = "logs.json";
/// Appointments list.
pub const APPOINTMENTS_PATH: &str = "agendamentos.json";
/// Folder holding one file per patient.
pub const PATIENTS_FOLDER: &str = "pacientes";

const CONFLICT_BACKOFF: Duration = Duration::from_millis(500);

/// Slug used to name patient files: lowercase, whitespace runs become a
/// hyphen, everything outside `[a-z0-9-]` is stripped. Part of the storage
/// contract, since external tooling locates patient files by name.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_whitespace = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('-');
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            if ch.is_ascii_alphanumeric() || ch == '-' {
                out.push(ch);
            }
        }
    }
    out
}

/// Full storage path of the patient file for `name`.
pub fn patient_path(name: &str) -> String {
    format!("{PATIENTS_FOLDER}/{}.json", slugify(name))
}

/// Load/save/delete/list over named JSON documents, with the record codec
/// applied transparently for patient and user records.
pub struct DocumentStore {
    host: Arc<dyn BlobHost>,
    cipher: FieldCipher,
}

impl DocumentStore {
    pub fn new(host: Arc<dyn BlobHost>, cipher: FieldCipher) -> Self {
        Self { host, cipher }
    }

    /// Loads and deserializes the document at `path`. A missing document is
    /// `Ok(None)`, not an error.
    pub async fn load_document<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.host.get(path).await {
            Ok(blob) => Ok(Some(serde_json::from_slice(&blob.content)?)),
            Err(BlobError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads a list-shaped document, defaulting to an empty list when the
    /// path does not exist. First-run systems work without provisioning.
    pub async fn load_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        Ok(self.load_document(path).await?.unwrap_or_default())
    }

    /// Serializes `value` and writes it at `path`, with `message` persisted
    /// as the change description on the host.
    ///
    /// The current version tag is fetched immediately before the write to
    /// shrink the race window. On [`BlobError::Conflict`] the write is
    /// retried exactly once after a fixed backoff; a second conflict is
    /// surfaced as [`StoreError::WriteConflict`].
    pub async fn save_document<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        message: &str,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let version = self.host.resolve_version(path).await?;
        match self.host.put(path, &bytes, version.as_deref(), message).await {
            Ok(()) => {
                info!(path, message, "document saved");
                Ok(())
            }
            Err(BlobError::Conflict) => {
                warn!(path, "version conflict, retrying once");
                tokio::time::sleep(CONFLICT_BACKOFF).await;
                let version = self.host.resolve_version(path).await?;
                match self.host.put(path, &bytes, version.as_deref(), message).await {
                    Ok(()) => {
                        info!(path, message, "document saved after retry");
                        Ok(())
                    }
                    Err(BlobError::Conflict) => Err(StoreError::WriteConflict),
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes the document at `path`. Fails with [`StoreError::NotFound`]
    /// when no current version can be resolved.
    pub async fn delete_document(&self, path: &str, message: &str) -> Result<(), StoreError> {
        let version = self
            .host
            .resolve_version(path)
            .await?
            .ok_or(StoreError::NotFound)?;
        self.host.delete(path, &version, message).await?;
        info!(path, message, "document deleted");
        Ok(())
    }

    /// Lists the entity files in `folder`, filtered to JSON documents.
    pub async fn list_entity_files(&self, folder: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let entries = self.host.list(folder).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.name.ends_with(".json"))
            .collect())
    }

    /// Loads one patient file and decrypts its sensitive fields.
    pub async fn load_patient(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .load_document::<Value>(path)
            .await?
            .map(|record| codec::decode_record(&self.cipher, RecordKind::Patient, &record)))
    }

    /// Encrypts the sensitive fields of `record` and saves the patient file.
    pub async fn save_patient(
        &self,
        path: &str,
        record: &Value,
        message: &str,
    ) -> Result<(), StoreError> {
        let encoded = codec::encode_record(&self.cipher, RecordKind::Patient, record);
        self.save_document(path, &encoded, message).await
    }

    /// Loads the users list, decrypting each record.
    pub async fn load_users(&self) -> Result<Vec<Value>, StoreError> {
        let users: Vec<Value> = self.load_list(USERS_PATH).await?;
        Ok(users
            .iter()
            .map(|user| codec::decode_record(&self.cipher, RecordKind::User, user))
            .collect())
    }

    /// Saves the users list, encrypting each record.
    pub async fn save_users(&self, users: &[Value], message: &str) -> Result<(), StoreError> {
        let encoded: Vec<Value> = users
            .iter()
            .map(|user| codec::encode_record(&self.cipher, RecordKind::User, user))
            .collect();
        self.save_document(USERS_PATH, &encoded, message).await
    }
}
