/// Litequery Error Module
///
/// This module defines the error type shared by every layer of the crate.
/// Database errors are carried unchanged so callers can inspect the driver's
/// own error value.
use thiserror::Error;

/// Error type for litequery.
///
/// The variants follow the failure classes of the library:
/// - Database execution errors, propagated as raised by the driver
/// - Usage errors detected synchronously at the call site
/// - Requests for features the selected backend cannot provide
/// - Configuration loading problems
#[derive(Error, Debug)]
pub enum LiteQueryError {
    /// Errors raised by SQLite while preparing or executing a statement
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The API was called with arguments it cannot act on
    #[error("Usage error: {0}")]
    Usage(String),

    /// The requested feature is not available for this backend
    #[error("Not supported for this backend: {0}")]
    Unsupported(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LiteQueryError {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        LiteQueryError::Usage(msg.into())
    }
}

/// Type alias for Result to use LiteQueryError as the error type.
pub type Result<T> = std::result::Result<T, LiteQueryError>;
