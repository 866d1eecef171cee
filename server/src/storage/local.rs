//! Ciphertext files on local disk.
//!
//! Storage layout: `{root}/{key}`. The root is created on first write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{validate_key, with_timeout, BackendError, BlobBackend, HealthStatus};

pub struct LocalDiskBackend {
    root: PathBuf,
    timeout: Duration,
}

impl LocalDiskBackend {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the file path for a key.
    fn file_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(op: &str, path: &Path, e: std::io::Error) -> BackendError {
    BackendError::Unavailable(format!("{} {}: {}", op, path.display(), e))
}

#[async_trait]
impl BlobBackend for LocalDiskBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, ciphertext: Bytes) -> Result<(), BackendError> {
        let path = self.file_path(key)?;
        let root = self.root.clone();

        with_timeout(self.timeout, "local put", async move {
            tokio::fs::create_dir_all(&root)
                .await
                .map_err(|e| io_error("create dir", &root, e))?;
            tokio::fs::write(&path, &ciphertext)
                .await
                .map_err(|e| io_error("write", &path, e))?;
            tracing::debug!("Stored {} ({} bytes)", path.display(), ciphertext.len());
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Bytes, BackendError> {
        let path = self.file_path(key)?;
        let key = key.to_string();

        with_timeout(self.timeout, "local get", async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(BackendError::NotFound(key)),
                Err(e) => Err(io_error("read", &path, e)),
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = self.file_path(key)?;

        with_timeout(self.timeout, "local delete", async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("{} already absent", path.display());
                    Ok(())
                }
                Err(e) => Err(io_error("remove", &path, e)),
            }
        })
        .await
    }

    async fn health_check(&self) -> HealthStatus {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => HealthStatus {
                reachable: true,
                detail: format!("{} is a directory", self.root.display()),
            },
            Ok(_) => HealthStatus {
                reachable: false,
                detail: format!("{} exists but is not a directory", self.root.display()),
            },
            // Created lazily on first write
            Err(e) if e.kind() == ErrorKind::NotFound => HealthStatus {
                reachable: true,
                detail: format!("{} will be created on first write", self.root.display()),
            },
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "local health probe failed");
                HealthStatus {
                    reachable: false,
                    detail: format!("{} is not accessible", self.root.display()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(tmp: &tempfile::TempDir) -> LocalDiskBackend {
        LocalDiskBackend::new(tmp.path().join("uploads"), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_put_creates_root_and_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = backend(&tmp);
        assert!(!store.root().exists());

        store.put("abc.enc", Bytes::from_static(b"ciphertext")).await.unwrap();
        assert!(store.root().is_dir());
        assert_eq!(store.get("abc.enc").await.unwrap(), Bytes::from_static(b"ciphertext"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = backend(&tmp);
        assert_eq!(
            store.get("nope.enc").await,
            Err(BackendError::NotFound("nope.enc".into()))
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = backend(&tmp);
        store.put("k.enc", Bytes::from_static(b"x")).await.unwrap();

        store.delete("k.enc").await.unwrap();
        store.delete("k.enc").await.unwrap();
        assert!(matches!(store.get("k.enc").await, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = backend(&tmp);
        assert!(matches!(
            store.put("../escape", Bytes::new()).await,
            Err(BackendError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_health_check_before_first_write() {
        let tmp = tempfile::tempdir().unwrap();
        let status = backend(&tmp).health_check().await;
        assert!(status.reachable);
        assert!(status.detail.contains("first write"));
    }
}
