//! Owner-scoped ciphertext vault.
//!
//! The vault never sees plaintext: clients encrypt before upload and decrypt
//! after download. It enforces size ceilings, writes ciphertext to the primary
//! backend (falling back to local disk when the remote container is missing),
//! and records ownership + location in the [`registry::MetadataRegistry`].

pub mod registry;
pub mod routes;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::middleware::Identity;
use crate::clock::Clock;
use crate::config::LimitsConfig;
use crate::db::models::{BlobProjection, BlobRecord, StorageLocation};
use crate::db::{self, DbError};
use crate::storage::{classify_write_error, generate_key, BackendError, BlobBackend, HealthStatus, WriteDisposition};
use registry::MetadataRegistry;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("declared size {declared} exceeds the {limit}-byte limit")]
    PayloadTooLarge { declared: u64, limit: u64 },

    #[error("encrypted payload of {actual} bytes exceeds the {limit}-byte limit")]
    EncodedPayloadTooLarge { actual: u64, limit: u64 },

    #[error("{0}")]
    Validation(String),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(BackendError),

    #[error("metadata write failed: {0}")]
    MetadataWriteFailed(DbError),

    /// Absent and not-owned are deliberately the same error.
    #[error("file not found")]
    NotFoundOrNotOwned,

    #[error("ciphertext for blob {0} is missing")]
    ContentMissing(String),

    #[error(transparent)]
    Internal(#[from] DbError),
}

pub struct NewBlob {
    pub logical_name: String,
    pub declared_size: u64,
    pub ciphertext: Bytes,
}

#[derive(Debug)]
pub struct Download {
    pub logical_name: String,
    pub ciphertext: Bytes,
}

#[derive(Debug, Serialize)]
pub struct BackendHealth {
    pub role: &'static str,
    pub backend: &'static str,
    #[serde(flatten)]
    pub status: HealthStatus,
}

#[derive(Clone)]
pub struct VaultService {
    remote: Option<Arc<dyn BlobBackend>>,
    local: Arc<dyn BlobBackend>,
    registry: MetadataRegistry,
    limits: LimitsConfig,
    clock: Arc<dyn Clock>,
}

impl VaultService {
    /// `remote` is the primary backend when present; `local` is then only the
    /// fallback target. Without a remote, every blob goes to `local`.
    pub fn new(
        remote: Option<Arc<dyn BlobBackend>>,
        local: Arc<dyn BlobBackend>,
        registry: MetadataRegistry,
        limits: LimitsConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            local,
            registry,
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> LimitsConfig {
        self.limits
    }

    pub async fn upload(&self, identity: &Identity, blob: NewBlob) -> Result<BlobProjection, VaultError> {
        if blob.declared_size > self.limits.max_plaintext_bytes {
            return Err(VaultError::PayloadTooLarge {
                declared: blob.declared_size,
                limit: self.limits.max_plaintext_bytes,
            });
        }
        let actual = blob.ciphertext.len() as u64;
        if actual > self.limits.max_ciphertext_bytes {
            return Err(VaultError::EncodedPayloadTooLarge {
                actual,
                limit: self.limits.max_ciphertext_bytes,
            });
        }
        let logical_name = blob.logical_name.trim().to_string();
        if logical_name.is_empty() {
            return Err(VaultError::Validation("fileName is required".into()));
        }
        if blob.ciphertext.is_empty() {
            return Err(VaultError::Validation("encryptedContent is required".into()));
        }

        let key = generate_key();
        let location = self.write(&key, blob.ciphertext).await?;

        let record = BlobRecord {
            id: Uuid::now_v7().to_string(),
            owner_id: identity.user_id.clone(),
            logical_name,
            declared_size: blob.declared_size,
            location,
            created_at: self.clock.now(),
        };

        let registry = self.registry.clone();
        let to_insert = record.clone();
        if let Err(e) = db::blocking::<_, DbError, _>(move || registry.insert(&to_insert)).await {
            // No rollback: the ciphertext stays behind for an operator sweep.
            tracing::error!(
                blob_id = %record.id,
                key = %record.location.key(),
                location = record.location.kind(),
                user_id = %identity.user_id,
                error = %e,
                "metadata write failed, ciphertext orphaned"
            );
            return Err(VaultError::MetadataWriteFailed(e));
        }

        tracing::info!(
            blob_id = %record.id,
            user_id = %identity.user_id,
            size = record.declared_size,
            location = record.location.kind(),
            "blob uploaded"
        );
        Ok(record.projection())
    }

    /// Write to the primary backend, retrying once on local disk when the
    /// remote container is missing.
    async fn write(&self, key: &str, ciphertext: Bytes) -> Result<StorageLocation, VaultError> {
        let Some(remote) = &self.remote else {
            self.local
                .put(key, ciphertext)
                .await
                .map_err(|e| write_failed(self.local.as_ref(), key, e))?;
            return Ok(StorageLocation::Local(key.to_string()));
        };

        let err = match remote.put(key, ciphertext.clone()).await {
            Ok(()) => return Ok(StorageLocation::Remote(key.to_string())),
            Err(err) => err,
        };

        match classify_write_error(&err) {
            WriteDisposition::RetryLocal => {
                tracing::warn!(key, error = %err, "remote container missing, falling back to local disk");
                self.local
                    .put(key, ciphertext)
                    .await
                    .map_err(|e| write_failed(self.local.as_ref(), key, e))?;
                Ok(StorageLocation::Local(key.to_string()))
            }
            WriteDisposition::Transient | WriteDisposition::Fatal => {
                Err(write_failed(remote.as_ref(), key, err))
            }
        }
    }

    pub async fn list(&self, identity: &Identity) -> Result<Vec<BlobProjection>, VaultError> {
        let registry = self.registry.clone();
        let owner = identity.user_id.clone();
        let records = db::blocking(move || registry.list_by_owner(&owner)).await?;
        Ok(records.iter().map(BlobRecord::projection).collect())
    }

    pub async fn download(&self, identity: &Identity, blob_id: &str) -> Result<Download, VaultError> {
        let record = self.owned_record(identity, blob_id).await?;

        let Some(backend) = self.backend_for(&record.location) else {
            tracing::error!(blob_id, key = record.location.key(), "record points at an unconfigured remote backend");
            return Err(VaultError::ContentMissing(record.id));
        };

        match backend.get(record.location.key()).await {
            Ok(ciphertext) => Ok(Download {
                logical_name: record.logical_name,
                ciphertext,
            }),
            Err(e) => {
                tracing::error!(
                    blob_id,
                    key = record.location.key(),
                    backend = backend.name(),
                    error = %e,
                    "ciphertext fetch failed"
                );
                Err(VaultError::ContentMissing(record.id))
            }
        }
    }

    /// The record goes first: if that fails the ciphertext is untouched and
    /// the file stays downloadable. A failed backend delete afterwards only
    /// leaves an orphaned object behind.
    pub async fn delete(&self, identity: &Identity, blob_id: &str) -> Result<(), VaultError> {
        let record = self.owned_record(identity, blob_id).await?;

        let registry = self.registry.clone();
        let id = record.id.clone();
        let removed = db::blocking(move || registry.delete(&id)).await?;
        if !removed {
            // Lost a race with a concurrent delete of the same blob.
            return Err(VaultError::NotFoundOrNotOwned);
        }

        match self.backend_for(&record.location) {
            Some(backend) => {
                if let Err(e) = backend.delete(record.location.key()).await {
                    tracing::warn!(
                        blob_id,
                        key = record.location.key(),
                        backend = backend.name(),
                        error = %e,
                        "backend delete failed, ciphertext orphaned"
                    );
                }
            }
            None => tracing::warn!(
                blob_id,
                key = record.location.key(),
                "no remote backend configured, ciphertext left in place"
            ),
        }

        tracing::info!(blob_id, user_id = %identity.user_id, "blob deleted");
        Ok(())
    }

    /// Probe every configured backend. Diagnostic only.
    pub async fn storage_health(&self) -> Vec<BackendHealth> {
        let mut report = Vec::with_capacity(2);
        if let Some(remote) = &self.remote {
            report.push(BackendHealth {
                role: "primary",
                backend: remote.name(),
                status: remote.health_check().await,
            });
        }
        report.push(BackendHealth {
            role: if self.remote.is_some() { "fallback" } else { "primary" },
            backend: self.local.name(),
            status: self.local.health_check().await,
        });
        report
    }

    async fn owned_record(&self, identity: &Identity, blob_id: &str) -> Result<BlobRecord, VaultError> {
        let registry = self.registry.clone();
        let id = blob_id.to_string();
        let record = db::blocking(move || registry.find(&id)).await?;
        match record {
            Some(record) if record.owner_id == identity.user_id => Ok(record),
            _ => Err(VaultError::NotFoundOrNotOwned),
        }
    }

    fn backend_for(&self, location: &StorageLocation) -> Option<&Arc<dyn BlobBackend>> {
        match location {
            StorageLocation::Remote(_) => self.remote.as_ref(),
            StorageLocation::Local(_) => Some(&self.local),
        }
    }
}

fn write_failed(backend: &dyn BlobBackend, key: &str, err: BackendError) -> VaultError {
    tracing::error!(key, backend = backend.name(), error = %err, "ciphertext write failed");
    VaultError::StorageWriteFailed(err)
}
