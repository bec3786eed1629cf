/// Connection Management Module
///
/// This module owns the live database connection, parses DSNs, and scopes
/// units of work inside transactions and savepoints.

use crate::core::{LiteQueryError, Result};
use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;
use regex::Regex;
use rusqlite::Connection;
use std::cell::Cell;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

static DBI_DSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:dbi):([A-Za-z0-9_]+):(.*)$").unwrap());
static URL_DSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://(.*)$").unwrap());

/// Database backends recognised in a DSN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
    MySql,
    Other,
}

impl Backend {
    fn from_driver(driver: &str) -> Self {
        match driver.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Backend::Sqlite,
            "pg" | "postgres" | "postgresql" => Backend::Postgres,
            "mysql" | "mariadb" => Backend::MySql,
            _ => Backend::Other,
        }
    }

    /// Whether the backend can report the key generated by the last insert
    pub fn supports_last_insert_id(&self) -> bool {
        matches!(self, Backend::Sqlite | Backend::MySql)
    }
}

/// A parsed data source name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub backend: Backend,
    /// Driver name as written in the DSN
    pub driver: String,
    /// Database file path, or ":memory:"
    pub database: String,
}

impl Dsn {
    /// Parses the DSN forms accepted by `ConnectionManager::connect`.
    ///
    /// `dbi:SQLite:dbname=app.db`, `dbi:SQLite:app.db`, `sqlite://app.db`,
    /// `sqlite::memory:`, `:memory:` and bare file paths all name SQLite.
    pub fn parse(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(LiteQueryError::usage("a DSN is required to connect"));
        }

        if let Some(caps) = DBI_DSN.captures(dsn) {
            let driver = caps[1].to_string();
            return Ok(Dsn {
                backend: Backend::from_driver(&driver),
                database: dbi_database(&caps[2]),
                driver,
            });
        }

        if let Some(caps) = URL_DSN.captures(dsn) {
            let driver = caps[1].to_string();
            return Ok(Dsn {
                backend: Backend::from_driver(&driver),
                database: caps[2].to_string(),
                driver,
            });
        }

        if let Some(rest) = dsn.strip_prefix("sqlite:") {
            return Ok(Dsn::sqlite(rest));
        }

        Ok(Dsn::sqlite(dsn))
    }

    pub fn sqlite(database: impl Into<String>) -> Self {
        Dsn {
            backend: Backend::Sqlite,
            driver: "SQLite".to_string(),
            database: database.into(),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.database.is_empty() || self.database == ":memory:"
    }
}

/// Extracts the database from the attribute part of a `dbi:` DSN.
fn dbi_database(attributes: &str) -> String {
    for part in attributes.split(';') {
        match part.split_once('=') {
            Some((key, value)) => {
                if matches!(key.trim(), "dbname" | "database" | "db") {
                    return value.trim().to_string();
                }
            }
            None if !part.trim().is_empty() => return part.trim().to_string(),
            None => {}
        }
    }
    String::new()
}

/// Settings applied once to a freshly opened connection
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub busy_timeout: Option<Duration>,
    /// Capacity of the prepared statement cache
    pub statement_cache_capacity: Option<usize>,
    /// Pragmas run after opening, e.g. `foreign_keys = ON`
    pub pragmas: Vec<String>,
}

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Transaction in progress
    Transaction,
}

struct DbState {
    connection: Connection,
    /// Number of open transaction and savepoint scopes
    depth: Cell<usize>,
}

/// Owner of the live connection.
///
/// Every statement issued by a connector runs through `run`, `txn` or
/// `savepoint`. The lock is re-entrant, so code running inside a transaction
/// on one thread may issue further statements through the same manager.
pub struct ConnectionManager {
    dsn: Dsn,
    state: ReentrantMutex<DbState>,
}

impl ConnectionManager {
    /// Opens a connection for `dsn`.
    ///
    /// Credentials are accepted for every backend; SQLite ignores them.
    ///
    /// # Errors
    ///
    /// `LiteQueryError::Usage` for an empty DSN, `LiteQueryError::Unsupported`
    /// when the DSN names a backend other than SQLite, and
    /// `LiteQueryError::Database` when the file cannot be opened.
    pub fn connect(dsn: &str, user: Option<&str>, password: Option<&str>) -> Result<Self> {
        Self::connect_with(dsn, user, password, &ConnectOptions::default())
    }

    pub fn connect_with(
        dsn: &str,
        user: Option<&str>,
        password: Option<&str>,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let dsn = Dsn::parse(dsn)?;
        if dsn.backend != Backend::Sqlite {
            return Err(LiteQueryError::Unsupported(format!(
                "cannot open a {} connection, only SQLite is available",
                dsn.driver
            )));
        }
        if user.is_some() || password.is_some() {
            debug!("SQLite ignores connection credentials");
        }

        let connection = if dsn.is_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&dsn.database)?
        };
        configure(&connection, options)?;

        info!(database = %dsn.database, "connected");
        Ok(Self::with_dsn(connection, dsn))
    }

    /// Wraps an already opened connection
    pub fn from_connection(connection: Connection) -> Self {
        Self::with_dsn(connection, Dsn::sqlite(""))
    }

    fn with_dsn(connection: Connection, dsn: Dsn) -> Self {
        ConnectionManager {
            dsn,
            state: ReentrantMutex::new(DbState {
                connection,
                depth: Cell::new(0),
            }),
        }
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    pub fn backend(&self) -> Backend {
        self.dsn.backend
    }

    /// Runs `f` against the live connection.
    pub fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.state.lock();
        f(&guard.connection)
    }

    /// Runs `f` inside a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err` or panics. Inside an open transaction `f` simply joins it.
    pub fn txn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.state.lock();
        if guard.depth.get() > 0 {
            return f(&guard.connection);
        }
        let scope = Scope::begin(&guard, ScopeKind::Transaction)?;
        let result = f(&guard.connection);
        scope.finish(result)
    }

    /// Runs `f` inside a savepoint, or a transaction when none is open.
    ///
    /// An `Err` from `f` rolls back only the work done since the savepoint.
    pub fn savepoint<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.state.lock();
        let kind = match guard.depth.get() {
            0 => ScopeKind::Transaction,
            depth => ScopeKind::Savepoint(format!("litequery_sp_{}", depth)),
        };
        let scope = Scope::begin(&guard, kind)?;
        let result = f(&guard.connection);
        scope.finish(result)
    }

    pub fn transaction_state(&self) -> TransactionState {
        if self.state.lock().connection.is_autocommit() {
            TransactionState::Autocommit
        } else {
            TransactionState::Transaction
        }
    }

    /// Returns the rowid generated by the most recent insert.
    pub fn last_insert_id(&self) -> Result<i64> {
        if !self.dsn.backend.supports_last_insert_id() {
            return Err(LiteQueryError::Unsupported(format!(
                "last insert id is not available for {}",
                self.dsn.driver
            )));
        }
        self.run(|conn| Ok(conn.last_insert_rowid()))
    }

    /// Checks the connection is usable.
    pub fn ping(&self) -> Result<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("dsn", &self.dsn)
            .finish_non_exhaustive()
    }
}

fn configure(connection: &Connection, options: &ConnectOptions) -> Result<()> {
    if let Some(timeout) = options.busy_timeout {
        connection.busy_timeout(timeout)?;
    }
    if let Some(capacity) = options.statement_cache_capacity {
        connection.set_prepared_statement_cache_capacity(capacity);
    }
    for pragma in &options.pragmas {
        connection.execute_batch(&format!("PRAGMA {};", pragma))?;
    }
    Ok(())
}

enum ScopeKind {
    Transaction,
    Savepoint(String),
}

/// An open transaction or savepoint; rolled back on drop unless finished.
struct Scope<'a> {
    state: &'a DbState,
    kind: ScopeKind,
    done: bool,
}

impl<'a> Scope<'a> {
    fn begin(state: &'a DbState, kind: ScopeKind) -> Result<Self> {
        let sql = match &kind {
            ScopeKind::Transaction => "BEGIN".to_string(),
            ScopeKind::Savepoint(name) => format!("SAVEPOINT {}", name),
        };
        debug!(%sql, "opening scope");
        state.connection.execute_batch(&sql)?;
        state.depth.set(state.depth.get() + 1);
        Ok(Scope {
            state,
            kind,
            done: false,
        })
    }

    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.done = true;
        self.state.depth.set(self.state.depth.get() - 1);
        match result {
            Ok(value) => {
                let sql = match &self.kind {
                    ScopeKind::Transaction => "COMMIT".to_string(),
                    ScopeKind::Savepoint(name) => format!("RELEASE SAVEPOINT {}", name),
                };
                debug!(%sql, "closing scope");
                if let Err(err) = self.state.connection.execute_batch(&sql) {
                    self.rollback();
                    return Err(err.into());
                }
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "rolling back after error");
                self.rollback();
                Err(err)
            }
        }
    }

    fn rollback(&self) {
        let sql = match &self.kind {
            ScopeKind::Transaction => "ROLLBACK".to_string(),
            ScopeKind::Savepoint(name) => {
                format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", name)
            }
        };
        if let Err(err) = self.state.connection.execute_batch(&sql) {
            warn!(error = %err, "rollback failed");
        }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state.depth.set(self.state.depth.get() - 1);
            self.rollback();
        }
    }
}
