//! Key-value backends with optimistic-concurrency semantics
//!
//! A [`KvBackend`] stores opaque string documents under versioned keys.
//! Writers use `compare_and_swap` so that concurrent instances sharing
//! one backend never overwrite each other blindly. Two backends ship:
//! an in-process [`MemoryBackend`] and a Redis-backed one.

pub mod backend;
pub mod error;
pub mod memory;
pub mod redis_backend;

pub use backend::{KvBackend, VersionedValue};
pub use error::KvError;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
