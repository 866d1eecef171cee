//! S3-compatible object storage via the `object_store` crate.
//!
//! Object name: `{prefix}/{key}` (or just `{key}` without a prefix).
//! A PUT answered with 404, or any error naming `NoSuchBucket`, means the
//! bucket itself is missing and is reported as
//! [`BackendError::ContainerMissing`], the one error class the vault answers
//! with a local-disk fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use super::{validate_key, with_timeout, BackendError, BlobBackend, HealthStatus};
use crate::config::StorageConfig;

#[derive(Debug, Clone, Copy)]
enum Op {
    Put,
    Get,
    Delete,
}

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: Option<String>,
    timeout: Duration,
}

impl ObjectStoreBackend {
    /// Build an S3 client from `[storage]`. Credentials not set in config
    /// fall back to the standard `AWS_*` environment variables.
    pub fn s3(config: &StorageConfig) -> Result<Self, BackendError> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| BackendError::Config("storage.bucket is required for the s3 backend".into()))?;

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        tracing::info!(bucket = %bucket, region = %config.region, "S3 backend configured");

        Ok(Self::from_store(
            Arc::new(store),
            bucket,
            config.prefix.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    /// Wrap an already-built store.
    pub fn from_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        timeout: Duration,
    ) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self {
            store,
            bucket: bucket.into(),
            prefix,
            timeout,
        }
    }

    fn object_path(&self, key: &str) -> Result<ObjectPath, BackendError> {
        validate_key(key)?;
        Ok(match &self.prefix {
            Some(prefix) => ObjectPath::from(format!("{prefix}/{key}")),
            None => ObjectPath::from(key),
        })
    }

    fn map_error(&self, op: Op, key: &str, err: object_store::Error) -> BackendError {
        if let object_store::Error::NotFound { .. } = err {
            return match op {
                // PUT never targets an existing object, so 404 is the bucket
                Op::Put => BackendError::ContainerMissing(self.bucket.clone()),
                Op::Get | Op::Delete => BackendError::NotFound(key.to_string()),
            };
        }

        let detail = err.to_string();
        if detail.contains("NoSuchBucket") {
            BackendError::ContainerMissing(self.bucket.clone())
        } else if detail.contains("QuotaExceeded") || detail.contains("EntityTooLarge") {
            BackendError::QuotaExceeded
        } else {
            BackendError::Unavailable(detail)
        }
    }

    /// The probe result is served unauthenticated; raw client errors only go to the log.
    fn unreachable(&self, err: object_store::Error) -> HealthStatus {
        tracing::warn!(bucket = %self.bucket, error = %err, "S3 health probe failed");
        HealthStatus {
            reachable: false,
            detail: format!("bucket {} unreachable", self.bucket),
        }
    }
}

#[async_trait]
impl BlobBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, ciphertext: Bytes) -> Result<(), BackendError> {
        let path = self.object_path(key)?;
        let size = ciphertext.len();

        with_timeout(self.timeout, "s3 put", async {
            self.store
                .put(&path, PutPayload::from(ciphertext))
                .await
                .map_err(|e| self.map_error(Op::Put, key, e))?;
            tracing::debug!(bucket = %self.bucket, %path, size, "object stored");
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Bytes, BackendError> {
        let path = self.object_path(key)?;

        with_timeout(self.timeout, "s3 get", async {
            let object = self
                .store
                .get(&path)
                .await
                .map_err(|e| self.map_error(Op::Get, key, e))?;
            object
                .bytes()
                .await
                .map_err(|e| self.map_error(Op::Get, key, e))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = self.object_path(key)?;

        with_timeout(self.timeout, "s3 delete", async {
            match self.store.delete(&path).await {
                Ok(()) => Ok(()),
                Err(e) => match self.map_error(Op::Delete, key, e) {
                    BackendError::NotFound(_) | BackendError::ContainerMissing(_) => {
                        tracing::debug!(%path, "object already absent");
                        Ok(())
                    }
                    other => Err(other),
                },
            }
        })
        .await
    }

    async fn health_check(&self) -> HealthStatus {
        let prefix = self.prefix.as_deref().map(ObjectPath::from);
        let probe = tokio::time::timeout(self.timeout, self.store.list_with_delimiter(prefix.as_ref())).await;

        match probe {
            Ok(Ok(_)) => HealthStatus {
                reachable: true,
                detail: format!("bucket {} reachable", self.bucket),
            },
            Ok(Err(e)) => self.unreachable(e),
            Err(_) => HealthStatus {
                reachable: false,
                detail: format!("bucket {}: probe timed out", self.bucket),
            },
        }
    }
}
