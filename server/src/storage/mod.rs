//! Keyed ciphertext storage.
//!
//! Every backend offers the same four operations behind [`BlobBackend`]. The
//! vault never names a concrete backend; it is handed trait objects at
//! startup (object store + local disk in production, [`memory::MemoryBackend`]
//! in tests).
//!
//! Keys are server-generated (`{uuid}.enc`) and never reused, so backends do
//! not need to serialize concurrent writers for the same key.

pub mod local;
pub mod memory;
pub mod remote;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("no object stored under {0}")]
    NotFound(String),

    /// The configured remote container (bucket) does not exist.
    #[error("storage container {0} does not exist")]
    ContainerMissing(String),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("storage misconfigured: {0}")]
    Config(String),
}

/// Result of a connectivity probe. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub reachable: bool,
    pub detail: String,
}

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Short name for logs and health output.
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, ciphertext: Bytes) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Bytes, BackendError>;

    /// Idempotent: removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Side-effect-free probe.
    async fn health_check(&self) -> HealthStatus;
}

/// What the vault should do after a failed primary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Not worth retrying anywhere.
    Fatal,
    /// Target container is gone; write to local disk instead.
    RetryLocal,
    /// Temporary outage. Surfaced to the caller; no fallback.
    Transient,
}

/// Only a missing container redirects the write. Transient outages are
/// surfaced so a misconfiguration is never silently masked by local disk.
pub fn classify_write_error(err: &BackendError) -> WriteDisposition {
    match err {
        BackendError::ContainerMissing(_) => WriteDisposition::RetryLocal,
        BackendError::Unavailable(_) => WriteDisposition::Transient,
        BackendError::NotFound(_)
        | BackendError::QuotaExceeded
        | BackendError::InvalidKey(_)
        | BackendError::Config(_) => WriteDisposition::Fatal,
    }
}

/// Generate a fresh, filename-safe storage key.
pub fn generate_key() -> String {
    format!("{}.enc", uuid::Uuid::new_v4().simple())
}

/// Bound a backend call; expiry becomes [`BackendError::Unavailable`].
pub async fn with_timeout<T, F>(limit: Duration, op: &str, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Unavailable(format!(
            "{op} timed out after {}s",
            limit.as_secs_f32()
        ))),
    }
}

/// Keys must be a single path segment: no separators, no traversal.
pub fn validate_key(key: &str) -> Result<(), BackendError> {
    let ok = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(BackendError::InvalidKey(key.to_string()))
    }
}
