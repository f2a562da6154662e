//! Canonical datetime types shared across all Mailgate crates

use chrono::{DateTime as ChronoDateTime, Utc};

/// Database DateTime type used across all Mailgate crates
///
/// This is the canonical datetime type for TIMESTAMPTZ columns.
pub type DBDateTime = ChronoDateTime<Utc>;

/// Standard UTC DateTime type used across all Mailgate crates
///
/// Serializes as ISO 8601 with timezone offset in API responses.
pub type UtcDateTime = ChronoDateTime<Utc>;
