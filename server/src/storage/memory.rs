//! In-process backend for tests, with injectable failures.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::{BackendError, BlobBackend, HealthStatus};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: DashMap<String, Bytes>,
    put_failure: Mutex<Option<BackendError>>,
    get_failure: Mutex<Option<BackendError>>,
    delete_failure: Mutex<Option<BackendError>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent `put` fails with `err` (until cleared with `None`).
    pub fn fail_puts(&self, err: Option<BackendError>) {
        *self.put_failure.lock().unwrap_or_else(|e| e.into_inner()) = err;
    }

    pub fn fail_gets(&self, err: Option<BackendError>) {
        *self.get_failure.lock().unwrap_or_else(|e| e.into_inner()) = err;
    }

    pub fn fail_deletes(&self, err: Option<BackendError>) {
        *self.delete_failure.lock().unwrap_or_else(|e| e.into_inner()) = err;
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Drop an object behind the vault's back.
    pub fn evict(&self, key: &str) {
        self.objects.remove(key);
    }

    fn injected(slot: &Mutex<Option<BackendError>>) -> Option<BackendError> {
        slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, ciphertext: Bytes) -> Result<(), BackendError> {
        if let Some(err) = Self::injected(&self.put_failure) {
            return Err(err);
        }
        self.objects.insert(key.to_string(), ciphertext);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BackendError> {
        if let Some(err) = Self::injected(&self.get_failure) {
            return Err(err);
        }
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        if let Some(err) = Self::injected(&self.delete_failure) {
            return Err(err);
        }
        self.objects.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            reachable: true,
            detail: format!("{} objects in memory", self.objects.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_put_failure_then_recovery() {
        let backend = MemoryBackend::new();
        backend.fail_puts(Some(BackendError::ContainerMissing("bucket".into())));
        assert_eq!(
            backend.put("k", Bytes::from_static(b"x")).await,
            Err(BackendError::ContainerMissing("bucket".into()))
        );
        assert!(backend.is_empty());

        backend.fail_puts(None);
        backend.put("k", Bytes::from_static(b"x")).await.unwrap();
        assert!(backend.contains("k"));
    }
}
