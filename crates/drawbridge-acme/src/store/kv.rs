//! Store backed by a versioned key-value backend

use std::sync::Arc;

use async_trait::async_trait;
use drawbridge_kv::{KvBackend, VersionedValue};

use super::{Store, StoreTransaction};
use crate::errors::StoreError;
use crate::types::StoredData;

/// Stores the whole JSON document under one key and relies on the
/// backend's version counter for optimistic concurrency. Useful when
/// several instances share certificate state through Redis.
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
    key: String,
}

impl KvStore {
    pub fn new(backend: Arc<dyn KvBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    async fn read(&self) -> Result<(StoredData, Option<u64>), StoreError> {
        match self.backend.get(&self.key).await? {
            Some(VersionedValue { value, version }) => {
                Ok((serde_json::from_str(&value)?, Some(version)))
            }
            None => Ok((StoredData::default(), None)),
        }
    }
}

#[async_trait]
impl Store for KvStore {
    async fn load(&self) -> Result<StoredData, StoreError> {
        Ok(self.read().await?.0)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let (data, version) = self.read().await?;
        Ok(Box::new(KvTransaction {
            backend: Arc::clone(&self.backend),
            key: self.key.clone(),
            version,
            data,
        }))
    }
}

struct KvTransaction {
    backend: Arc<dyn KvBackend>,
    key: String,
    version: Option<u64>,
    data: StoredData,
}

#[async_trait]
impl StoreTransaction for KvTransaction {
    fn data(&mut self) -> &mut StoredData {
        &mut self.data
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&self.data)?;
        let swapped = self
            .backend
            .compare_and_swap(&self.key, self.version, payload)
            .await?;
        if !swapped {
            return Err(StoreError::Conflict(self.key));
        }
        Ok(())
    }
}
