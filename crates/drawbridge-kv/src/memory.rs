//! In-process KV backend for tests and single-node deployments

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{KvBackend, VersionedValue};
use crate::error::KvError;

/// HashMap-backed [`KvBackend`] with full compare-and-swap semantics.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, VersionedValue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: Option<u64>,
        value: String,
    ) -> Result<bool, KvError> {
        let mut data = self.data.write().await;

        let next_version = match (data.get(key), expected_version) {
            (None, None) => 1,
            (Some(current), Some(expected)) if current.version == expected => expected + 1,
            _ => return Ok(false),
        };

        data.insert(
            key.to_string(),
            VersionedValue {
                value,
                version: next_version,
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_key() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_requires_absent_key() {
        let backend = MemoryBackend::new();

        let created = backend
            .compare_and_swap("k", None, "v1".to_string())
            .await
            .unwrap();
        assert!(created);

        let stored = backend.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, "v1");
        assert_eq!(stored.version, 1);

        // A second create against the same key conflicts.
        let created_again = backend
            .compare_and_swap("k", None, "v2".to_string())
            .await
            .unwrap();
        assert!(!created_again);
    }

    #[tokio::test]
    async fn test_swap_bumps_version() {
        let backend = MemoryBackend::new();
        backend
            .compare_and_swap("k", None, "v1".to_string())
            .await
            .unwrap();

        let swapped = backend
            .compare_and_swap("k", Some(1), "v2".to_string())
            .await
            .unwrap();
        assert!(swapped);

        let stored = backend.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, "v2");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let backend = MemoryBackend::new();
        backend
            .compare_and_swap("k", None, "v1".to_string())
            .await
            .unwrap();
        backend
            .compare_and_swap("k", Some(1), "v2".to_string())
            .await
            .unwrap();

        // Writer still holding version 1 must lose.
        let swapped = backend
            .compare_and_swap("k", Some(1), "v3".to_string())
            .await
            .unwrap();
        assert!(!swapped);

        let stored = backend.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, "v2");
    }

    #[tokio::test]
    async fn test_swap_against_missing_key_conflicts() {
        let backend = MemoryBackend::new();
        let swapped = backend
            .compare_and_swap("k", Some(1), "v1".to_string())
            .await
            .unwrap();
        assert!(!swapped);
    }
}
