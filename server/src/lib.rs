//! Backend for opening repertoire study: owner-scoped repertoire storage,
//! practice sessions with per-session serialized writes, accounts and
//! tutoring, all over a single SQLite database.

pub mod accounts;
pub mod config;
pub mod error;
pub mod persistence;
pub mod practice;
pub mod repertoires;
pub mod tutor;

pub use config::ServerConfig;
pub use error::{ErrorKind, ServiceError};
