/// Core Module for litequery
///
/// Shared infrastructure: the error type and the database layer that every
/// result set executes through.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{LiteQueryError, Result};
