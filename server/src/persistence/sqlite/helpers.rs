//! Shared encode/decode helpers for SQLite ↔ domain type conversions.
//!
//! Text columns are decoded strictly: a value the schema's CHECK constraints
//! would not have let in surfaces as [`PersistenceError::Decode`] instead of
//! being mapped to a fallback.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::persistence::PersistenceError;

// ── Timestamps ─────────────────────────────────────────────────────────

/// Timestamps are stored as Unix milliseconds.
pub fn encode_time(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn decode_time(column: &'static str, millis: i64) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| PersistenceError::Decode {
        column,
        reason: format!("timestamp {millis} out of range"),
    })
}

// ── Text-encoded values (ids, enums) ───────────────────────────────────

/// Parse a `TEXT` column through the type's `FromStr`.
pub fn decode_text<T>(column: &'static str, raw: &str) -> Result<T, PersistenceError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| PersistenceError::Decode {
        column,
        reason: e.to_string(),
    })
}

/// Decode an unsigned counter stored as `INTEGER`.
pub fn decode_count(column: &'static str, raw: i64) -> Result<u32, PersistenceError> {
    u32::try_from(raw).map_err(|_| PersistenceError::Decode {
        column,
        reason: format!("{raw} is not a valid count"),
    })
}

// ── Error classification ───────────────────────────────────────────────

/// Map a unique-index violation to [`PersistenceError::Duplicate`].
pub fn duplicate_as(what: &'static str, err: sqlx::Error) -> PersistenceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => PersistenceError::Duplicate(what),
        _ => PersistenceError::Sqlx(err),
    }
}
