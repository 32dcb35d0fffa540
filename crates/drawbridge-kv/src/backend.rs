//! The versioned key-value port

use async_trait::async_trait;

use crate::error::KvError;

/// A stored document together with its monotonically increasing version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
}

/// Versioned key-value storage.
///
/// Versions start at 1 on creation and increase by 1 on every successful
/// write. `compare_and_swap` is the only mutation: callers read the
/// current version with `get`, then write conditioned on it. A swap with
/// `expected_version: None` succeeds only if the key does not exist yet.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError>;

    /// Returns `true` if the write was applied, `false` on a version
    /// conflict. The caller decides whether to re-read and retry.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: Option<u64>,
        value: String,
    ) -> Result<bool, KvError>;
}
