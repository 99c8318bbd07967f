//! Core error types for cadence-core.
//!
//! Two families live here. `CoreError` and its children cover fallible I/O
//! (database, configuration files, recovery storage) and are returned as
//! `Result`s. `EngineError` covers operations the session engine refuses;
//! those are never returned from engine commands, only logged and kept
//! for inspection.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::Phase;

/// Core error type for cadence-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Recovery snapshot errors
    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session runner task has exited
    #[error("session runner is no longer running")]
    RunnerClosed,

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Could not resolve the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Recovery snapshot storage errors.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The stored blob could not be decoded
    #[error("Corrupt recovery snapshot under '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// The backing store failed
    #[error("Snapshot store failed: {0}")]
    Store(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// An operation the session engine refused.
///
/// Refusals leave engine state untouched. They are logged through
/// `tracing` and the latest one is available from
/// [`SessionEngine::last_rejection`](crate::SessionEngine::last_rejection).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot {operation} while {phase}")]
    InvalidPhaseForOperation {
        operation: &'static str,
        phase: Phase,
    },

    #[error("a run is already in progress ({phase})")]
    AlreadyInProgress { phase: Phase },

    #[error("recovery snapshot is {age_secs}s old, older than the {window_secs}s window")]
    StaleRecoverySnapshot { age_secs: i64, window_secs: i64 },

    #[error("sequence rejected: {0}")]
    InvalidSequence(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::InvalidValue {
            key: "<document>".into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::RestKind;

    #[test]
    fn engine_error_messages_name_the_phase() {
        let err = EngineError::InvalidPhaseForOperation {
            operation: "pause",
            phase: Phase::Idle,
        };
        assert_eq!(err.to_string(), "cannot pause while idle");

        let err = EngineError::AlreadyInProgress {
            phase: Phase::Resting(RestKind::Long),
        };
        assert_eq!(err.to_string(), "a run is already in progress (long rest)");
    }

    #[test]
    fn database_error_wraps_into_core_error() {
        let err: CoreError = DatabaseError::Locked.into();
        assert!(matches!(err, CoreError::Database(DatabaseError::Locked)));
        assert_eq!(err.to_string(), "Database error: Database is locked");
    }
}
