//! The connector: the one component that talks to the database.
//!
//! A `Connector` is a cheap, cloneable handle around a shared
//! `ConnectionManager` and a shared `SqlBuilder`. It hands out result sets
//! and runs the statements they build.

use crate::config::Config;
use crate::core::db::{BindValue, ConnectOptions, ConnectionManager, Fetched, QueryExecutor, Shape};
use crate::core::{LiteQueryError, Result};
use crate::pager::DEFAULT_ENTRIES_PER_PAGE;
use crate::resultset::ResultSet;
use crate::sql::SqlBuilder;
use rusqlite::Connection;
use std::sync::Arc;

/// What a connector is built from: connection credentials, or a manager
/// that is already connected.
#[derive(Debug)]
pub enum ConnectSource {
    Dsn {
        dsn: String,
        user: Option<String>,
        password: Option<String>,
    },
    Manager(Arc<ConnectionManager>),
}

impl From<&str> for ConnectSource {
    fn from(dsn: &str) -> Self {
        ConnectSource::Dsn {
            dsn: dsn.to_string(),
            user: None,
            password: None,
        }
    }
}

impl From<ConnectionManager> for ConnectSource {
    fn from(manager: ConnectionManager) -> Self {
        ConnectSource::Manager(Arc::new(manager))
    }
}

impl From<Arc<ConnectionManager>> for ConnectSource {
    fn from(manager: Arc<ConnectionManager>) -> Self {
        ConnectSource::Manager(manager)
    }
}

#[derive(Debug, Clone)]
pub struct Connector {
    manager: Arc<ConnectionManager>,
    sql: Arc<SqlBuilder>,
    default_rows: u64,
}

impl Connector {
    /// Builds a connector from credentials or an existing manager.
    ///
    /// # Errors
    ///
    /// Connecting from a DSN fails as `ConnectionManager::connect` does.
    pub fn new(source: impl Into<ConnectSource>) -> Result<Self> {
        let manager = match source.into() {
            ConnectSource::Dsn { dsn, user, password } => Arc::new(ConnectionManager::connect(
                &dsn,
                user.as_deref(),
                password.as_deref(),
            )?),
            ConnectSource::Manager(manager) => manager,
        };
        Ok(Connector {
            manager,
            sql: Arc::new(SqlBuilder::new()),
            default_rows: DEFAULT_ENTRIES_PER_PAGE,
        })
    }

    /// Connects with a DSN and credentials
    pub fn connect(dsn: &str, user: &str, password: &str) -> Result<Self> {
        Connector::new(ConnectSource::Dsn {
            dsn: dsn.to_string(),
            user: Some(user.to_string()),
            password: Some(password.to_string()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let manager = ConnectionManager::connect_with(
            &config.database.dsn,
            config.database.user.as_deref(),
            config.database.password.as_deref(),
            &config.connect_options(),
        )?;
        let sql = match config.quote_char() {
            Some(quote) => SqlBuilder::with_quote_char(quote),
            None => SqlBuilder::new(),
        };
        Ok(Connector::new(manager)?
            .with_sql_builder(sql)
            .with_default_rows(config.default_rows()))
    }

    /// Opens an in-memory database with default options
    pub fn in_memory() -> Result<Self> {
        let manager = ConnectionManager::connect_with(":memory:", None, None, &ConnectOptions::default())?;
        Connector::new(manager)
    }

    pub fn with_sql_builder(mut self, sql: SqlBuilder) -> Self {
        self.sql = Arc::new(sql);
        self
    }

    /// Page size for result sets with a `page` clause but no `rows` clause
    pub fn with_default_rows(mut self, rows: u64) -> Self {
        self.default_rows = rows;
        self
    }

    /// Creates an unfiltered result set for `table`.
    pub fn resultset(&self, table: &str) -> Result<ResultSet> {
        if table.trim().is_empty() {
            return Err(LiteQueryError::usage("a result set needs a table name"));
        }
        Ok(ResultSet::new(self.clone(), table.to_string()))
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn sql(&self) -> &SqlBuilder {
        &self.sql
    }

    pub fn default_rows(&self) -> u64 {
        self.default_rows
    }

    pub fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.manager.run(f)
    }

    /// Runs `f` in a transaction. Result sets used inside `f` join it.
    pub fn txn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.manager.txn(f)
    }

    pub fn savepoint<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.manager.savepoint(f)
    }

    /// Runs a statement that returns no rows; returns the changed row count.
    pub fn execute(&self, sql: &str, binds: &[BindValue]) -> Result<usize> {
        self.manager.run(|conn| QueryExecutor::new(conn).execute(sql, binds))
    }

    pub fn fetch(&self, shape: &Shape, sql: &str, binds: &[BindValue]) -> Result<Fetched> {
        self.manager.run(|conn| QueryExecutor::new(conn).fetch(shape, sql, binds))
    }

    /// Parses `sql` into the statement cache so later runs skip preparation.
    pub fn prepare(&self, sql: &str) -> Result<()> {
        self.manager.run(|conn| {
            conn.prepare_cached(sql)?;
            Ok(())
        })
    }

    pub fn last_insert_id(&self) -> Result<i64> {
        self.manager.last_insert_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_connect_with_credentials() {
        let connector = Connector::connect("dbi:SQLite:dbname=:memory:", "user", "pass").unwrap();
        connector.manager().ping().unwrap();
        assert_eq!(connector.default_rows(), DEFAULT_ENTRIES_PER_PAGE);
    }

    #[test]
    fn test_connect_requires_dsn() {
        match Connector::new("") {
            Err(LiteQueryError::Usage(_)) => {}
            other => panic!("Expected usage error, got {:?}", other),
        }
    }

    #[test]
    fn test_existing_manager_is_shared() {
        let manager = Arc::new(ConnectionManager::connect(":memory:", None, None).unwrap());
        let a = Connector::new(Arc::clone(&manager)).unwrap();
        let b = Connector::new(Arc::clone(&manager)).unwrap();

        a.execute("CREATE TABLE shared (id INTEGER)", &[]).unwrap();
        b.execute("INSERT INTO shared VALUES (?)", &[BindValue::Integer(1)]).unwrap();
        let count = a
            .fetch(&Shape::Scalar, "SELECT COUNT(*) FROM shared", &[])
            .unwrap()
            .into_scalar()
            .unwrap();
        assert_eq!(count, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_resultset_requires_table() {
        let connector = Connector::in_memory().unwrap();
        assert!(matches!(connector.resultset(" "), Err(LiteQueryError::Usage(_))));
        assert_eq!(connector.resultset("users").unwrap().table(), "users");
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_toml_str(
            "[database]\ndsn = \":memory:\"\n[sql]\nquote_char = '\"'\n[paging]\nrows = 3\n",
        )
        .unwrap();
        let connector = Connector::from_config(&config).unwrap();
        assert_eq!(connector.default_rows(), 3);
        assert_eq!(connector.sql().quote_char(), Some('"'));
    }

    #[test]
    fn test_prepare_reports_errors_immediately() {
        let connector = Connector::in_memory().unwrap();
        assert!(matches!(
            connector.prepare("SELECT * FROM missing"),
            Err(LiteQueryError::Database(_))
        ));
    }
}
