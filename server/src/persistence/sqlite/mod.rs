//! SQLite-backed repository implementations.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode** so readers never block the single writer.
//! - **Foreign keys enabled** at the connection level, which makes deleting a
//!   repertoire cascade to its openings and a session to its moves.
//! - **Embedded migrations** from `migrations/`, run by [`Database::open`].
//!
//! ## Repository types
//!
//! Each `Sqlite*Repository` holds a cloned `SqlitePool` and implements the
//! corresponding trait from [`crate::persistence::traits`]:
//!
//! | Type | Trait | Tables |
//! |------|-------|--------|
//! | [`SqliteRepertoireRepository`] | `RepertoireRepository` | `repertoires`, `openings` |
//! | [`SqlitePracticeSessionRepository`] | `PracticeSessionRepository` | `practice_sessions`, `practice_moves` |
//! | [`SqliteUserRepository`] | `UserRepository` | `users` |
//!
//! Ids, enums and timestamps are stored as `TEXT`/`INTEGER` and converted by
//! the shared helpers in [`helpers`].

mod database;
pub(crate) mod helpers;
mod practice_repo;
mod repertoire_repo;
mod user_repo;
#[cfg(test)]
mod integration_tests;

pub use database::Database;
pub use practice_repo::SqlitePracticeSessionRepository;
pub use repertoire_repo::SqliteRepertoireRepository;
pub use user_repo::SqliteUserRepository;
