//! Persistence for account and certificate state

mod kv;
pub mod legacy;
mod local;

pub use kv::KvStore;
pub use local::LocalStore;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::types::StoredData;

/// Durable storage for account and certificate state.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the full stored state, empty defaults when nothing exists yet.
    async fn load(&self) -> Result<StoredData, StoreError>;

    /// Starts a load-modify-commit cycle.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// One load-modify-commit cycle against a store.
///
/// Mutate [`StoreTransaction::data`] in place, then commit to write it
/// back. Commit fails with [`StoreError::Conflict`] when another writer
/// raced this transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    fn data(&mut self) -> &mut StoredData;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
