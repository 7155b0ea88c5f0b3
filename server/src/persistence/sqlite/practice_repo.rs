//! SQLite-backed repository for practice sessions.

use chrono::{DateTime, Utc};
use repertoire::{
    MoveSubmission, PracticeConfig, PracticeMove, PracticeSession, RepertoireId, SessionId, Stats,
    UserId,
};
use sqlx::SqlitePool;

use super::helpers::{decode_count, decode_text, decode_time, encode_time};
use crate::persistence::traits::PracticeSessionRepository;
use crate::persistence::PersistenceError;

/// Row type for session headers, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    repertoire_id: String,
    opening_id: Option<String>,
    mode: String,
    color: String,
    started_at: i64,
    ended_at: Option<i64>,
    max_moves: i64,
    difficulty: String,
    allow_variations: bool,
    total_moves: i64,
    book_moves: i64,
    best_moves: i64,
    good_moves: i64,
    inaccuracies: i64,
    mistakes: i64,
    blunders: i64,
    accuracy_percentage: f64,
}

impl SessionRow {
    fn into_session(self, moves: Vec<PracticeMove>) -> Result<PracticeSession, PersistenceError> {
        Ok(PracticeSession {
            id: decode_text("practice_sessions.id", &self.id)?,
            user_id: decode_text("practice_sessions.user_id", &self.user_id)?,
            repertoire_id: decode_text("practice_sessions.repertoire_id", &self.repertoire_id)?,
            opening_id: self
                .opening_id
                .as_deref()
                .map(|raw| decode_text("practice_sessions.opening_id", raw))
                .transpose()?,
            mode: decode_text("practice_sessions.mode", &self.mode)?,
            color: decode_text("practice_sessions.color", &self.color)?,
            started_at: decode_time("practice_sessions.started_at", self.started_at)?,
            ended_at: self
                .ended_at
                .map(|t| decode_time("practice_sessions.ended_at", t))
                .transpose()?,
            moves,
            stats: Stats {
                total_moves: decode_count("total_moves", self.total_moves)?,
                book_moves: decode_count("book_moves", self.book_moves)?,
                best_moves: decode_count("best_moves", self.best_moves)?,
                good_moves: decode_count("good_moves", self.good_moves)?,
                inaccuracies: decode_count("inaccuracies", self.inaccuracies)?,
                mistakes: decode_count("mistakes", self.mistakes)?,
                blunders: decode_count("blunders", self.blunders)?,
                accuracy_percentage: self.accuracy_percentage,
            },
            config: PracticeConfig {
                max_moves: decode_count("max_moves", self.max_moves)?,
                difficulty: self.difficulty,
                allow_variations: self.allow_variations,
            },
        })
    }
}

/// Row type for move queries, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct MoveRow {
    ply: i64,
    fen_before: String,
    fen_after: String,
    user_move: String,
    expected_move: Option<String>,
    category: String,
    eval_before: i32,
    eval_after: i32,
    centipawn_loss: i32,
}

impl TryFrom<MoveRow> for PracticeMove {
    type Error = PersistenceError;

    fn try_from(r: MoveRow) -> Result<Self, Self::Error> {
        Ok(Self {
            ply: decode_count("practice_moves.ply", r.ply)?,
            fen_before: r.fen_before,
            fen_after: r.fen_after,
            user_move: r.user_move,
            expected_move: r.expected_move,
            category: decode_text("practice_moves.category", &r.category)?,
            eval_before: r.eval_before,
            eval_after: r.eval_after,
            centipawn_loss: r.centipawn_loss,
        })
    }
}

const SELECT_SESSION: &str = r#"
    SELECT id, user_id, repertoire_id, opening_id, mode, color, started_at, ended_at,
           max_moves, difficulty, allow_variations,
           total_moves, book_moves, best_moves, good_moves,
           inaccuracies, mistakes, blunders, accuracy_percentage
    FROM practice_sessions
"#;

/// SQLite implementation of [`PracticeSessionRepository`].
#[derive(Clone)]
pub struct SqlitePracticeSessionRepository {
    pool: SqlitePool,
}

impl SqlitePracticeSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, rows: Vec<SessionRow>) -> Result<Vec<PracticeSession>, PersistenceError> {
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let moves = load_moves_for_session(&self.pool, &row.id).await?;
            sessions.push(row.into_session(moves)?);
        }
        Ok(sessions)
    }

    /// Explain why a guarded write on `id` matched no row.
    async fn diagnose(&self, id: &str, owner: &str) -> Result<PersistenceError, PersistenceError> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT ended_at FROM practice_sessions WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            None => PersistenceError::NotFound("practice session"),
            Some((Some(_),)) => PersistenceError::SessionEnded,
            // Still open, so the move count no longer matched.
            Some((None,)) => PersistenceError::StaleSession,
        })
    }
}

impl PracticeSessionRepository for SqlitePracticeSessionRepository {
    async fn create_session(&self, session: &PracticeSession) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO practice_sessions
                (id, user_id, repertoire_id, opening_id, mode, color, started_at, ended_at,
                 max_moves, difficulty, allow_variations,
                 total_moves, book_moves, best_moves, good_moves,
                 inaccuracies, mistakes, blunders, accuracy_percentage)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(session.repertoire_id.to_string())
        .bind(session.opening_id.map(|id| id.to_string()))
        .bind(session.mode.as_str())
        .bind(session.color.as_str())
        .bind(encode_time(session.started_at))
        .bind(session.ended_at.map(encode_time))
        .bind(i64::from(session.config.max_moves))
        .bind(&session.config.difficulty)
        .bind(session.config.allow_variations)
        .bind(i64::from(session.stats.total_moves))
        .bind(i64::from(session.stats.book_moves))
        .bind(i64::from(session.stats.best_moves))
        .bind(i64::from(session.stats.good_moves))
        .bind(i64::from(session.stats.inaccuracies))
        .bind(i64::from(session.stats.mistakes))
        .bind(i64::from(session.stats.blunders))
        .bind(session.stats.accuracy_percentage)
        .execute(&mut *tx)
        .await?;

        for mv in &session.moves {
            insert_move_row(&mut *tx, &session.id.to_string(), mv).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_move(
        &self,
        id: SessionId,
        owner: UserId,
        submission: &MoveSubmission,
    ) -> Result<PracticeMove, PersistenceError> {
        let mut mv = submission.clone().into_move(0);
        let id = id.to_string();
        let owner = owner.to_string();

        // Ply assignment and the ended check happen inside this one statement.
        let ply: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO practice_moves
                (session_id, ply, fen_before, fen_after, user_move, expected_move,
                 category, eval_before, eval_after, centipawn_loss)
            SELECT s.id,
                   (SELECT COALESCE(MAX(m.ply), 0) + 1
                    FROM practice_moves m WHERE m.session_id = s.id),
                   ?, ?, ?, ?, ?, ?, ?, ?
            FROM practice_sessions s
            WHERE s.id = ? AND s.user_id = ? AND s.ended_at IS NULL
            RETURNING ply
            "#,
        )
        .bind(&mv.fen_before)
        .bind(&mv.fen_after)
        .bind(&mv.user_move)
        .bind(&mv.expected_move)
        .bind(mv.category.as_str())
        .bind(mv.eval_before)
        .bind(mv.eval_after)
        .bind(mv.centipawn_loss)
        .bind(&id)
        .bind(&owner)
        .fetch_optional(&self.pool)
        .await?;

        match ply {
            Some((ply,)) => {
                mv.ply = decode_count("practice_moves.ply", ply)?;
                Ok(mv)
            }
            None => Err(self.diagnose(&id, &owner).await?),
        }
    }

    async fn finalize_session(
        &self,
        id: SessionId,
        owner: UserId,
        move_count: u32,
        ended_at: DateTime<Utc>,
        stats: &Stats,
    ) -> Result<(), PersistenceError> {
        let id = id.to_string();
        let owner = owner.to_string();

        let result = sqlx::query(
            r#"
            UPDATE practice_sessions
            SET ended_at = ?,
                total_moves = ?, book_moves = ?, best_moves = ?, good_moves = ?,
                inaccuracies = ?, mistakes = ?, blunders = ?, accuracy_percentage = ?
            WHERE id = ? AND user_id = ? AND ended_at IS NULL
              AND (SELECT COUNT(*) FROM practice_moves m
                   WHERE m.session_id = practice_sessions.id) = ?
            "#,
        )
        .bind(encode_time(ended_at))
        .bind(i64::from(stats.total_moves))
        .bind(i64::from(stats.book_moves))
        .bind(i64::from(stats.best_moves))
        .bind(i64::from(stats.good_moves))
        .bind(i64::from(stats.inaccuracies))
        .bind(i64::from(stats.mistakes))
        .bind(i64::from(stats.blunders))
        .bind(stats.accuracy_percentage)
        .bind(&id)
        .bind(&owner)
        .bind(i64::from(move_count))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.diagnose(&id, &owner).await?);
        }
        Ok(())
    }

    async fn load_session(
        &self,
        id: SessionId,
        owner: UserId,
    ) -> Result<Option<PracticeSession>, PersistenceError> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("{SELECT_SESSION} WHERE id = ? AND user_id = ?"))
                .bind(id.to_string())
                .bind(owner.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some(r) => {
                let moves = load_moves_for_session(&self.pool, &r.id).await?;
                r.into_session(moves).map(Some)
            }
        }
    }

    async fn history(
        &self,
        owner: UserId,
        limit: u32,
    ) -> Result<Vec<PracticeSession>, PersistenceError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_SESSION} WHERE user_id = ? ORDER BY started_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(owner.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn history_for_repertoire(
        &self,
        owner: UserId,
        repertoire_id: RepertoireId,
    ) -> Result<Vec<PracticeSession>, PersistenceError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_SESSION} WHERE user_id = ? AND repertoire_id = ? \
             ORDER BY started_at DESC, rowid DESC"
        ))
        .bind(owner.to_string())
        .bind(repertoire_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }
}

async fn insert_move_row(
    conn: &mut sqlx::SqliteConnection,
    session_id: &str,
    mv: &PracticeMove,
) -> Result<(), PersistenceError> {
    sqlx::query(
        r#"
        INSERT INTO practice_moves
            (session_id, ply, fen_before, fen_after, user_move, expected_move,
             category, eval_before, eval_after, centipawn_loss)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(i64::from(mv.ply))
    .bind(&mv.fen_before)
    .bind(&mv.fen_after)
    .bind(&mv.user_move)
    .bind(&mv.expected_move)
    .bind(mv.category.as_str())
    .bind(mv.eval_before)
    .bind(mv.eval_after)
    .bind(mv.centipawn_loss)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load all moves for a session ordered by ply.
async fn load_moves_for_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<PracticeMove>, PersistenceError> {
    let rows: Vec<MoveRow> = sqlx::query_as(
        r#"
        SELECT ply, fen_before, fen_after, user_move, expected_move,
               category, eval_before, eval_after, centipawn_loss
        FROM practice_moves
        WHERE session_id = ?
        ORDER BY ply
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PracticeMove::try_from).collect()
}
