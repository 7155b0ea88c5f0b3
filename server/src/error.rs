//! Error taxonomy exposed by the services.
//!
//! Domain and persistence errors are wrapped unchanged; [`ServiceError::kind`]
//! classifies them for the caller and [`ErrorKind::http_status`] gives the
//! status a router should answer with.

use repertoire::{TreeError, ValidationError};

use crate::accounts::AuthError;
use crate::persistence::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    /// Missing, or owned by someone else.
    NotFound,
    Conflict,
    InvalidState,
    Unauthenticated,
    Timeout,
    Unavailable,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidInput | ErrorKind::InvalidState => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Timeout | ErrorKind::Unavailable => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid credentials")]
    Unauthenticated,
    #[error(transparent)]
    Auth(AuthError),
    #[error("Tutor unavailable: {0}")]
    Tutor(String),
    #[error("Practice session worker stopped")]
    WorkerGone,
}

impl ServiceError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ServiceError::Validation(ValidationError::OutOfRange {
            field,
            reason: reason.into(),
        })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(ValidationError::Tree(
                TreeError::NotFound | TreeError::PathNotFound(_),
            )) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::InvalidInput,
            ServiceError::Persistence(e) => persistence_kind(e),
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Unauthenticated => ErrorKind::Unauthenticated,
            ServiceError::Auth(AuthError::InvalidToken) => ErrorKind::Unauthenticated,
            ServiceError::Auth(AuthError::Provider(_)) => ErrorKind::Unavailable,
            ServiceError::Tutor(_) => ErrorKind::Unavailable,
            ServiceError::WorkerGone => ErrorKind::Unavailable,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidToken => ServiceError::Unauthenticated,
            other => ServiceError::Auth(other),
        }
    }
}

fn persistence_kind(e: &PersistenceError) -> ErrorKind {
    match e {
        PersistenceError::NotFound(_) => ErrorKind::NotFound,
        PersistenceError::Duplicate(_)
        | PersistenceError::VersionConflict
        | PersistenceError::StaleSession => ErrorKind::Conflict,
        PersistenceError::SessionEnded => ErrorKind::InvalidState,
        PersistenceError::Timeout(_) | PersistenceError::Sqlx(sqlx::Error::PoolTimedOut) => {
            ErrorKind::Timeout
        }
        PersistenceError::Sqlx(_)
        | PersistenceError::Migration(_)
        | PersistenceError::Decode { .. }
        | PersistenceError::Json(_)
        | PersistenceError::Io(_) => ErrorKind::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ServiceError, ErrorKind, u16)> = vec![
            (
                ValidationError::Missing("user_move").into(),
                ErrorKind::InvalidInput,
                400,
            ),
            (
                PersistenceError::NotFound("repertoire").into(),
                ErrorKind::NotFound,
                404,
            ),
            (PersistenceError::Duplicate("user").into(), ErrorKind::Conflict, 409),
            (PersistenceError::VersionConflict.into(), ErrorKind::Conflict, 409),
            (PersistenceError::SessionEnded.into(), ErrorKind::InvalidState, 400),
            (
                PersistenceError::Timeout(Duration::from_secs(10)).into(),
                ErrorKind::Timeout,
                500,
            ),
            (
                PersistenceError::Migration("boom".into()).into(),
                ErrorKind::Unavailable,
                500,
            ),
            (ServiceError::Unauthenticated, ErrorKind::Unauthenticated, 401),
        ];
        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind, "{err}");
            assert_eq!(err.http_status(), status, "{err}");
        }
    }

    #[test]
    fn test_missing_tree_node_is_not_found() {
        let err: ServiceError = ValidationError::from(TreeError::PathNotFound(vec![0, 3])).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: ServiceError = ValidationError::from(TreeError::SameFen {
            san: "e4".into(),
            fen: "x".into(),
        })
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_invalid_token_is_unauthenticated() {
        let err: ServiceError = AuthError::InvalidToken.into();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        let err: ServiceError = AuthError::Provider("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
