//! SQLite-backed repository for repertoires.
//!
//! A repertoire is split across `repertoires` (header + version) and
//! `openings` (one row per opening, tree stored as JSON). Every write that
//! touches an opening also bumps the header's version inside the same
//! transaction, so a concurrent whole-document save notices it.

use chrono::{DateTime, Utc};
use repertoire::{Color, MoveTree, Opening, OpeningId, Repertoire, RepertoireId, UserId};
use sqlx::{SqliteConnection, SqlitePool};

use super::helpers::{decode_text, decode_time, duplicate_as, encode_time};
use crate::persistence::traits::RepertoireRepository;
use crate::persistence::PersistenceError;

/// Row type for repertoire headers, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct RepertoireRow {
    id: String,
    user_id: String,
    name: String,
    color: String,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl RepertoireRow {
    fn into_repertoire(self, openings: Vec<Opening>) -> Result<Repertoire, PersistenceError> {
        let mut repertoire = Repertoire::new(
            decode_text("repertoires.user_id", &self.user_id)?,
            self.name,
            decode_text("repertoires.color", &self.color)?,
            decode_time("repertoires.created_at", self.created_at)?,
        )
        .with_version(self.version);
        repertoire.id = decode_text("repertoires.id", &self.id)?;
        repertoire.updated_at = decode_time("repertoires.updated_at", self.updated_at)?;
        repertoire.openings = openings;
        Ok(repertoire)
    }
}

/// Row type for openings, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct OpeningRow {
    id: String,
    name: String,
    eco: Option<String>,
    starting_fen: String,
    moves_json: String,
}

impl TryFrom<OpeningRow> for Opening {
    type Error = PersistenceError;

    fn try_from(r: OpeningRow) -> Result<Self, Self::Error> {
        let moves: MoveTree = serde_json::from_str(&r.moves_json)?;
        Ok(Opening {
            id: decode_text("openings.id", &r.id)?,
            name: r.name,
            eco: r.eco,
            starting_fen: r.starting_fen,
            moves,
        })
    }
}

const SELECT_REPERTOIRE: &str = r#"
    SELECT id, user_id, name, color, version, created_at, updated_at
    FROM repertoires
"#;

/// SQLite implementation of [`RepertoireRepository`].
#[derive(Clone)]
pub struct SqliteRepertoireRepository {
    pool: SqlitePool,
}

impl SqliteRepertoireRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, rows: Vec<RepertoireRow>) -> Result<Vec<Repertoire>, PersistenceError> {
        let mut repertoires = Vec::with_capacity(rows.len());
        for row in rows {
            let openings = load_openings(&self.pool, &row.id).await?;
            repertoires.push(row.into_repertoire(openings)?);
        }
        Ok(repertoires)
    }
}

impl RepertoireRepository for SqliteRepertoireRepository {
    async fn insert_repertoire(&self, repertoire: &Repertoire) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO repertoires (id, user_id, name, color, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(repertoire.id.to_string())
        .bind(repertoire.user_id.to_string())
        .bind(&repertoire.name)
        .bind(repertoire.color.as_str())
        .bind(repertoire.version())
        .bind(encode_time(repertoire.created_at))
        .bind(encode_time(repertoire.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_as("repertoire", e))?;

        for (position, opening) in repertoire.openings.iter().enumerate() {
            insert_opening_row(&mut *tx, repertoire.id, position as i64, opening).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Repertoire>, PersistenceError> {
        let rows: Vec<RepertoireRow> = sqlx::query_as(&format!(
            "{SELECT_REPERTOIRE} WHERE user_id = ? ORDER BY created_at, rowid"
        ))
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn list_by_color(
        &self,
        owner: UserId,
        color: Color,
    ) -> Result<Vec<Repertoire>, PersistenceError> {
        let rows: Vec<RepertoireRow> = sqlx::query_as(&format!(
            "{SELECT_REPERTOIRE} WHERE user_id = ? AND color = ? ORDER BY created_at, rowid"
        ))
        .bind(owner.to_string())
        .bind(color.as_str())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn load_owned(
        &self,
        id: RepertoireId,
        owner: UserId,
    ) -> Result<Option<Repertoire>, PersistenceError> {
        let row: Option<RepertoireRow> =
            sqlx::query_as(&format!("{SELECT_REPERTOIRE} WHERE id = ? AND user_id = ?"))
                .bind(id.to_string())
                .bind(owner.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some(r) => {
                let openings = load_openings(&self.pool, &r.id).await?;
                r.into_repertoire(openings).map(Some)
            }
        }
    }

    async fn save_repertoire(&self, repertoire: &Repertoire) -> Result<i64, PersistenceError> {
        let id = repertoire.id.to_string();
        let owner = repertoire.user_id.to_string();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE repertoires
            SET name = ?, color = ?, updated_at = ?, version = version + 1
            WHERE id = ? AND user_id = ? AND version = ?
            "#,
        )
        .bind(&repertoire.name)
        .bind(repertoire.color.as_str())
        .bind(encode_time(repertoire.updated_at))
        .bind(&id)
        .bind(&owner)
        .bind(repertoire.version())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM repertoires WHERE id = ? AND user_id = ?")
                    .bind(&id)
                    .bind(&owner)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                None => PersistenceError::NotFound("repertoire"),
                Some(_) => PersistenceError::VersionConflict,
            });
        }

        sqlx::query("DELETE FROM openings WHERE repertoire_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for (position, opening) in repertoire.openings.iter().enumerate() {
            insert_opening_row(&mut *tx, repertoire.id, position as i64, opening).await?;
        }

        tx.commit().await?;
        Ok(repertoire.version() + 1)
    }

    async fn delete_repertoire(
        &self,
        id: RepertoireId,
        owner: UserId,
    ) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM repertoires WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(owner.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_opening(
        &self,
        repertoire_id: RepertoireId,
        owner: UserId,
        opening: &Opening,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        touch_owned(&mut *tx, repertoire_id, owner, now).await?;

        let (position,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM openings WHERE repertoire_id = ?",
        )
        .bind(repertoire_id.to_string())
        .fetch_one(&mut *tx)
        .await?;
        insert_opening_row(&mut *tx, repertoire_id, position, opening).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_opening(
        &self,
        repertoire_id: RepertoireId,
        owner: UserId,
        opening: &Opening,
        now: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let moves_json = serde_json::to_string(&opening.moves)?;
        let mut tx = self.pool.begin().await?;
        touch_owned(&mut *tx, repertoire_id, owner, now).await?;

        let updated = sqlx::query(
            r#"
            UPDATE openings
            SET name = ?, eco = ?, starting_fen = ?, moves_json = ?
            WHERE id = ? AND repertoire_id = ?
            "#,
        )
        .bind(&opening.name)
        .bind(&opening.eco)
        .bind(&opening.starting_fen)
        .bind(moves_json)
        .bind(opening.id.to_string())
        .bind(repertoire_id.to_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction also undoes the header bump.
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_opening(
        &self,
        repertoire_id: RepertoireId,
        owner: UserId,
        opening_id: OpeningId,
        now: DateTime<Utc>,
    ) -> Result<Option<Opening>, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        touch_owned(&mut *tx, repertoire_id, owner, now).await?;

        let row: Option<OpeningRow> = sqlx::query_as(
            r#"
            SELECT id, name, eco, starting_fen, moves_json
            FROM openings
            WHERE id = ? AND repertoire_id = ?
            "#,
        )
        .bind(opening_id.to_string())
        .bind(repertoire_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM openings WHERE id = ? AND repertoire_id = ?")
            .bind(opening_id.to_string())
            .bind(repertoire_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Opening::try_from(row).map(Some)
    }
}

/// Bump `updated_at` and `version` of an owned repertoire, or fail with
/// `NotFound` when the caller does not own it.
async fn touch_owned(
    conn: &mut SqliteConnection,
    repertoire_id: RepertoireId,
    owner: UserId,
    now: DateTime<Utc>,
) -> Result<(), PersistenceError> {
    let result = sqlx::query(
        "UPDATE repertoires SET updated_at = ?, version = version + 1 WHERE id = ? AND user_id = ?",
    )
    .bind(encode_time(now))
    .bind(repertoire_id.to_string())
    .bind(owner.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PersistenceError::NotFound("repertoire"));
    }
    Ok(())
}

async fn insert_opening_row(
    conn: &mut SqliteConnection,
    repertoire_id: RepertoireId,
    position: i64,
    opening: &Opening,
) -> Result<(), PersistenceError> {
    let moves_json = serde_json::to_string(&opening.moves)?;
    sqlx::query(
        r#"
        INSERT INTO openings (id, repertoire_id, position, name, eco, starting_fen, moves_json)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(opening.id.to_string())
    .bind(repertoire_id.to_string())
    .bind(position)
    .bind(&opening.name)
    .bind(&opening.eco)
    .bind(&opening.starting_fen)
    .bind(moves_json)
    .execute(&mut *conn)
    .await
    .map_err(|e| duplicate_as("opening", e))?;
    Ok(())
}

/// Load all openings of a repertoire in insertion order.
async fn load_openings(
    pool: &SqlitePool,
    repertoire_id: &str,
) -> Result<Vec<Opening>, PersistenceError> {
    let rows: Vec<OpeningRow> = sqlx::query_as(
        r#"
        SELECT id, name, eco, starting_fen, moves_json
        FROM openings
        WHERE repertoire_id = ?
        ORDER BY position
        "#,
    )
    .bind(repertoire_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Opening::try_from).collect()
}
