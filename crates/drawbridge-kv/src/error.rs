//! Error types for the KV backends

use thiserror::Error;

/// Errors that can occur in a KV backend
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}
