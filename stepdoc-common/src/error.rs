//! Common error types for stepdoc

use thiserror::Error;

/// Common result type for stepdoc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across stepdoc services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed request identifiers or acknowledgements
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Caller is not a member of the project being written
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Credit balance too low to cover a step charge
    #[error("Insufficient credit: need {required}, have {available}")]
    InsufficientCredit { required: i64, available: i64 },

    /// Write conflicts with existing row state (e.g. a submitted step)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
