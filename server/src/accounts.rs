//! Accounts: the `users` collection plus registration and login.
//!
//! Password hashing and token issuance are delegated to an [`AuthProvider`];
//! this module only enforces the account rules and owns persistence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use repertoire::{Color, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::persistence::{bounded, now, UserRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub board_theme: String,
    pub piece_set: String,
    pub board_orientation: Color,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            board_theme: "default".to_string(),
            piece_set: "cburnett".to_string(),
            board_orientation: Color::White,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default)]
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tokens handed to a client after register, login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl AuthResponse {
    fn new(tokens: AuthTokens, user: User) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Auth provider failure: {0}")]
    Provider(String),
}

/// Credential hashing and token issuance.
pub trait AuthProvider: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
    fn issue_tokens(&self, user: &User) -> Result<AuthTokens, AuthError>;
    /// Resolve a refresh token to the account it was issued for.
    fn verify_refresh_token(&self, token: &str) -> Result<UserId, AuthError>;
}

const MIN_PASSWORD_LEN: usize = 8;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

pub struct AccountService<U, A> {
    users: Arc<U>,
    auth: A,
    timeout: Duration,
}

impl<U: UserRepository, A: AuthProvider> AccountService<U, A> {
    pub fn new(users: Arc<U>, auth: A, timeout: Duration) -> Self {
        Self {
            users,
            auth,
            timeout,
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<AuthResponse, ServiceError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::invalid(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        let username = username.trim();
        if !USERNAME_LEN.contains(&username.chars().count()) {
            return Err(ServiceError::invalid(
                "username",
                format!(
                    "must be {}-{} characters",
                    USERNAME_LEN.start(),
                    USERNAME_LEN.end()
                ),
            ));
        }

        let timestamp = now();
        let user = User {
            id: UserId::new(),
            email,
            username: username.to_string(),
            password_hash: self.auth.hash_password(password)?,
            preferences: UserPreferences::default(),
            created_at: timestamp,
            updated_at: timestamp,
        };
        bounded(self.timeout, self.users.insert_user(&user)).await?;
        tracing::info!(user_id = %user.id, "Account registered");

        let tokens = self.auth.issue_tokens(&user)?;
        Ok(AuthResponse::new(tokens, user))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ServiceError> {
        let email = email.trim().to_lowercase();
        let user = bounded(self.timeout, self.users.find_by_email(&email))
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        if !self.auth.verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "Rejected login");
            return Err(ServiceError::Unauthenticated);
        }
        let tokens = self.auth.issue_tokens(&user)?;
        Ok(AuthResponse::new(tokens, user))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ServiceError> {
        let user_id = self.auth.verify_refresh_token(refresh_token)?;
        let user = bounded(self.timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        let tokens = self.auth.issue_tokens(&user)?;
        Ok(AuthResponse::new(tokens, user))
    }

    pub async fn me(&self, user_id: UserId) -> Result<User, ServiceError> {
        bounded(self.timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    pub async fn update_preferences(
        &self,
        user_id: UserId,
        preferences: UserPreferences,
    ) -> Result<User, ServiceError> {
        let updated = bounded(
            self.timeout,
            self.users.update_preferences(user_id, &preferences, now()),
        )
        .await?;
        if !updated {
            return Err(ServiceError::NotFound("user"));
        }
        self.me(user_id).await
    }
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ServiceError::invalid("email", "not a valid address")),
    }
}
