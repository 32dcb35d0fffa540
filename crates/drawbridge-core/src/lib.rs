//! Core utilities and types shared across all Drawbridge crates

pub mod backoff;
pub mod types;

// Re-export commonly used types
pub use backoff::Backoff;
pub use types::UtcDateTime;
