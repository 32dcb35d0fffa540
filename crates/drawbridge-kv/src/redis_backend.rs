//! Redis-backed KV storage
//!
//! Each logical key maps to two Redis keys: the document itself and a
//! `{key}:version` counter. Compare-and-swap runs as a Lua script so the
//! check and the write are atomic on the server.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::debug;

use crate::backend::{KvBackend, VersionedValue};
use crate::error::KvError;

const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[2])
if ARGV[1] == '' then
    if current then return 0 end
    redis.call('SET', KEYS[1], ARGV[2])
    redis.call('SET', KEYS[2], 1)
    return 1
end
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    redis.call('INCR', KEYS[2])
    return 1
end
return 0
"#;

/// [`KvBackend`] over a shared Redis instance, suitable for clustered
/// deployments where several proxy instances share one store.
pub struct RedisBackend {
    manager: ConnectionManager,
    cas: redis::Script,
}

impl RedisBackend {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client =
            Client::open(url).map_err(|e| KvError::ConnectionFailed(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| KvError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            manager,
            cas: redis::Script::new(CAS_SCRIPT),
        })
    }

    fn version_key(key: &str) -> String {
        format!("{}:version", key)
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, KvError> {
        let mut conn = self.manager.clone();
        let version_key = Self::version_key(key);

        debug!("KV MGET {} {}", key, version_key);

        // MGET is a single command, so value and version are consistent.
        let (value, version): (Option<String>, Option<u64>) = redis::cmd("MGET")
            .arg(key)
            .arg(&version_key)
            .query_async(&mut conn)
            .await?;

        match (value, version) {
            (Some(value), Some(version)) => Ok(Some(VersionedValue { value, version })),
            _ => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: Option<u64>,
        value: String,
    ) -> Result<bool, KvError> {
        let mut conn = self.manager.clone();
        let version_key = Self::version_key(key);
        let expected = expected_version
            .map(|v| v.to_string())
            .unwrap_or_default();

        debug!("KV CAS {} expected={:?}", key, expected_version);

        let applied: i64 = self
            .cas
            .key(key)
            .key(&version_key)
            .arg(&expected)
            .arg(&value)
            .invoke_async(&mut conn)
            .await?;

        Ok(applied == 1)
    }
}
