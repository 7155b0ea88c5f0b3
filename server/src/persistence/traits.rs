//! Async repository trait definitions for the persistence layer.
//!
//! Every read and write takes the owner's [`UserId`] and filters on it, so a
//! document owned by someone else is indistinguishable from a missing one.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send`, which `tokio::spawn` in the practice
//! actors requires.

use std::future::Future;

use chrono::{DateTime, Utc};
use repertoire::{
    Color, MoveSubmission, Opening, OpeningId, PracticeMove, PracticeSession, Repertoire,
    RepertoireId, SessionId, Stats, UserId,
};

use super::PersistenceError;
use crate::accounts::{User, UserPreferences};

/// Repository for repertoire documents and their embedded openings.
pub trait RepertoireRepository: Send + Sync {
    fn insert_repertoire(
        &self,
        repertoire: &Repertoire,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn list_by_owner(
        &self,
        owner: UserId,
    ) -> impl Future<Output = Result<Vec<Repertoire>, PersistenceError>> + Send;

    fn list_by_color(
        &self,
        owner: UserId,
        color: Color,
    ) -> impl Future<Output = Result<Vec<Repertoire>, PersistenceError>> + Send;

    fn load_owned(
        &self,
        id: RepertoireId,
        owner: UserId,
    ) -> impl Future<Output = Result<Option<Repertoire>, PersistenceError>> + Send;

    /// Replace the whole stored document, openings included, provided it is
    /// still at `repertoire.version()`. Returns the new version.
    ///
    /// Fails with `NotFound` when the document is gone and `VersionConflict`
    /// when it changed since it was read.
    fn save_repertoire(
        &self,
        repertoire: &Repertoire,
    ) -> impl Future<Output = Result<i64, PersistenceError>> + Send;

    /// Returns `false` when nothing was deleted.
    fn delete_repertoire(
        &self,
        id: RepertoireId,
        owner: UserId,
    ) -> impl Future<Output = Result<bool, PersistenceError>> + Send;

    /// Append an opening. `NotFound` when the repertoire is not owned.
    fn insert_opening(
        &self,
        repertoire_id: RepertoireId,
        owner: UserId,
        opening: &Opening,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Overwrite the opening with `opening.id` in place.
    ///
    /// Returns `false`, writing nothing, when the repertoire holds no such
    /// opening. A missing repertoire is still `NotFound`.
    fn replace_opening(
        &self,
        repertoire_id: RepertoireId,
        owner: UserId,
        opening: &Opening,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, PersistenceError>> + Send;

    fn delete_opening(
        &self,
        repertoire_id: RepertoireId,
        owner: UserId,
        opening_id: OpeningId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Opening>, PersistenceError>> + Send;
}

/// Repository for practice sessions and their append-only move logs.
///
/// Implementations must assign plies themselves, atomically with the insert,
/// so concurrent appends can neither collide nor leave gaps.
pub trait PracticeSessionRepository: Send + Sync + 'static {
    fn create_session(
        &self,
        session: &PracticeSession,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Append a move at ply `len + 1`. `NotFound` for a missing or foreign
    /// session, `SessionEnded` once it has ended.
    fn append_move(
        &self,
        id: SessionId,
        owner: UserId,
        submission: &MoveSubmission,
    ) -> impl Future<Output = Result<PracticeMove, PersistenceError>> + Send;

    /// Set `ended_at` and `stats` in one write, only if the session has not
    /// ended and still holds exactly `move_count` moves.
    fn finalize_session(
        &self,
        id: SessionId,
        owner: UserId,
        move_count: u32,
        ended_at: DateTime<Utc>,
        stats: &Stats,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn load_session(
        &self,
        id: SessionId,
        owner: UserId,
    ) -> impl Future<Output = Result<Option<PracticeSession>, PersistenceError>> + Send;

    /// Most recent first.
    fn history(
        &self,
        owner: UserId,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<PracticeSession>, PersistenceError>> + Send;

    fn history_for_repertoire(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
    ) -> impl Future<Output = Result<Vec<PracticeSession>, PersistenceError>> + Send;
}

/// Repository for accounts.
pub trait UserRepository: Send + Sync {
    /// `Duplicate` when the email is taken.
    fn insert_user(&self, user: &User) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, PersistenceError>> + Send;

    fn find_by_id(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, PersistenceError>> + Send;

    fn update_preferences(
        &self,
        id: UserId,
        preferences: &UserPreferences,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, PersistenceError>> + Send;
}
