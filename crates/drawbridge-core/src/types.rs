//! Custom types for common data structures

use chrono::{DateTime as ChronoDateTime, Utc};

/// Standard UTC DateTime type used across all Drawbridge crates
///
/// Serializes as ISO 8601 with 'Z' suffix: `2025-10-12T12:15:47.609192Z`
pub type UtcDateTime = ChronoDateTime<Utc>;
