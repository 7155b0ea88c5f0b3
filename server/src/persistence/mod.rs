//! Persistence layer: repository traits and their SQLite implementations.

pub mod sqlite;
pub mod traits;

pub use sqlite::{
    Database, SqlitePracticeSessionRepository, SqliteRepertoireRepository, SqliteUserRepository,
};
pub use traits::{PracticeSessionRepository, RepertoireRepository, UserRepository};

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("A {0} with the same key already exists")]
    Duplicate(&'static str),
    #[error("Repertoire was modified since it was read")]
    VersionConflict,
    #[error("Practice session has already ended")]
    SessionEnded,
    #[error("Practice session moves changed while ending it")]
    StaleSession,
    #[error("Corrupt value in column {column}: {reason}")]
    Decode { column: &'static str, reason: String },
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Run a store operation, failing with [`PersistenceError::Timeout`] once
/// `limit` has elapsed.
pub async fn bounded<T, F>(limit: Duration, op: F) -> Result<T, PersistenceError>
where
    F: Future<Output = Result<T, PersistenceError>>,
{
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| PersistenceError::Timeout(limit))?
}

/// Current time at the precision the store keeps (milliseconds).
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), _> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(PersistenceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let value = bounded(Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_now_has_millisecond_precision() {
        let t = now();
        assert_eq!(t.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
