//! Configuration for the openings server
//!
//! Every setting comes from the environment. The data directory is resolved
//! with the following precedence:
//! 1. OPENINGS_DATA_DIR environment variable
//! 2. the platform data directory (e.g. ~/.local/share/openings)
//! 3. ./data (fallback for development)
//!
//! Numeric settings that are missing or unparsable fall back to their
//! defaults with a warning.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;

const DEV_DATA_DIR: &str = "./data";
const DB_FILE_NAME: &str = "openings.db";

pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Upper bound on every store call.
    pub op_timeout: Duration,
    pub max_connections: u32,
    /// Sessions returned by a history query that names no limit.
    pub history_limit: u32,
    /// When set, logs go to a daily rolling file here instead of stderr.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = var("OPENINGS_DATA_DIR")
            .map(PathBuf::from)
            .or_else(platform_data_dir)
            .unwrap_or_else(|| PathBuf::from(DEV_DATA_DIR));
        let db_path = var("OPENINGS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));

        let op_timeout = Duration::from_secs(parse_or(
            "OPENINGS_OP_TIMEOUT_SECS",
            var("OPENINGS_OP_TIMEOUT_SECS"),
            DEFAULT_OP_TIMEOUT_SECS,
        ));
        let max_connections = parse_or(
            "OPENINGS_DB_MAX_CONNECTIONS",
            var("OPENINGS_DB_MAX_CONNECTIONS"),
            DEFAULT_MAX_CONNECTIONS,
        );
        let history_limit = parse_or(
            "OPENINGS_HISTORY_LIMIT",
            var("OPENINGS_HISTORY_LIMIT"),
            DEFAULT_HISTORY_LIMIT,
        );

        Self {
            data_dir,
            db_path,
            op_timeout,
            max_connections,
            history_limit,
            log_dir: var("OPENINGS_LOG_DIR").map(PathBuf::from),
        }
    }
}

fn platform_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "openings").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Positive number from `raw`, or `default`.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!(key, value = %raw, default = %default, "Ignoring invalid setting");
            default
        }
    }
}
