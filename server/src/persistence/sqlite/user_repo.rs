//! SQLite-backed repository for accounts.

use chrono::{DateTime, Utc};
use repertoire::UserId;
use sqlx::SqlitePool;

use super::helpers::{decode_text, decode_time, duplicate_as, encode_time};
use crate::accounts::{User, UserPreferences};
use crate::persistence::traits::UserRepository;
use crate::persistence::PersistenceError;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    username: String,
    password_hash: String,
    board_theme: String,
    piece_set: String,
    board_orientation: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = PersistenceError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: decode_text("users.id", &r.id)?,
            email: r.email,
            username: r.username,
            password_hash: r.password_hash,
            preferences: UserPreferences {
                board_theme: r.board_theme,
                piece_set: r.piece_set,
                board_orientation: decode_text("users.board_orientation", &r.board_orientation)?,
            },
            created_at: decode_time("users.created_at", r.created_at)?,
            updated_at: decode_time("users.updated_at", r.updated_at)?,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT id, email, username, password_hash, board_theme, piece_set,
           board_orientation, created_at, updated_at
    FROM users
"#;

/// SQLite implementation of [`UserRepository`].
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserRepository for SqliteUserRepository {
    async fn insert_user(&self, user: &User) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, username, password_hash, board_theme, piece_set,
                 board_orientation, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.preferences.board_theme)
        .bind(&user.preferences.piece_set)
        .bind(user.preferences.board_orientation.as_str())
        .bind(encode_time(user.created_at))
        .bind(encode_time(user.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_as("user", e))?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, PersistenceError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, PersistenceError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn update_preferences(
        &self,
        id: UserId,
        preferences: &UserPreferences,
        now: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET board_theme = ?, piece_set = ?, board_orientation = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&preferences.board_theme)
        .bind(&preferences.piece_set)
        .bind(preferences.board_orientation.as_str())
        .bind(encode_time(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
