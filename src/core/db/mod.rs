/// Database Module
///
/// ## Architecture
///
/// The database layer is split into two concerns:
/// - **Connection Management** (`connection.rs`): DSN parsing, the live connection, transactions and savepoints
/// - **Query Execution** (`query.rs`): statement execution and shaping of raw rows into result values
///
/// Errors raised by SQLite surface as `LiteQueryError::Database` without translation.
pub mod connection;
pub mod query;

pub use connection::*;
pub use query::*;
