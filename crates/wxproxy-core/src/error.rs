//! Shared error types for the wxproxy workspace.
//!
//! Errors fall into two channels:
//! - fatal to the current call (configuration, validation, database access)
//! - advisory, logged and absorbed by the caller (cache, persistence)
//!
//! Crate-specific errors (`UpstreamError`, `PersistError`) live next to the
//! code that raises them and wrap these where needed.

use thiserror::Error;

/// Configuration errors.
///
/// Messages name the offending setting but never include its value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::ParseError(e.to_string())
    }
}

/// Malformed or missing caller input. Always client-fixable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Database access errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database credentials are not configured (DB_DSN is unset)")]
    NotConfigured,

    #[error("Connection pool exhausted: no connection available within {waited_ms}ms (max {max})")]
    PoolExhausted { max: u32, waited_ms: u64 },

    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::NotConfigured => "Database is not configured.",
            DatabaseError::PoolExhausted { .. } => "Database is busy. Please try again.",
            DatabaseError::ConnectionFailed(_) => "Database connectivity error",
            DatabaseError::QueryFailed(_) => "A data operation failed.",
            DatabaseError::Corruption(_) => "Stored data may be corrupted.",
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                DatabaseError::ConnectionFailed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}
