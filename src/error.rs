//! Error types for the dispatch service.

use std::time::Duration;

use crate::dispatch::model::WorkerId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by a redistribution trigger.
///
/// Empty pools are not errors; they come back as a report outcome.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Worker {0} does not exist")]
    UnknownWorker(WorkerId),

    #[error("Redistribution lock still held after {waited:?}")]
    Busy { waited: Duration },

    /// The active flag could not be written; nothing changed.
    #[error("Failed to update employee status: {0}")]
    StatusUpdate(DatabaseError),

    /// The active flag was written but no redistribution pass completed.
    #[error("Status updated but redistribution did not complete: {0}")]
    PassIncomplete(Box<DispatchError>),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl DispatchError {
    /// Whether the whole pass may be attempted again.
    ///
    /// Snapshot reads fail before any assignment is written, so store errors
    /// are retryable as well as lock timeouts.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Busy { .. } | Self::StatusUpdate(_) | Self::Database(_) => true,
            Self::PassIncomplete(inner) => inner.is_retryable(),
            Self::UnknownWorker(_) => false,
        }
    }

    /// Whether the trigger's status change was persisted despite the error.
    pub fn status_persisted(&self) -> bool {
        matches!(self, Self::PassIncomplete(_))
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
