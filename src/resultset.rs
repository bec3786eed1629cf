//! Result sets: immutable query state for one table.
//!
//! A `ResultSet` carries a filter and a set of clauses. `search` never
//! changes the receiver; it returns a new result set with the merged state.
//! The execution methods translate that state into one statement, run it
//! through the connector and shape the rows.
//!
//! ```no_run
//! use litequery::{Clauses, Connector, Filter};
//! use serde_json::json;
//!
//! let connector = Connector::connect("dbi:SQLite:dbname=app.db", "", "")?;
//! let adults = connector
//!     .resultset("users")?
//!     .refine(Filter::new().and("status", 0))
//!     .refine(Filter::new().and("age", json!({">=": 18})));
//! let page = adults.search(Filter::new(), Clauses::new().page(2).rows(20));
//! for row in page.array_of_hash_rows(&["user_id", "email"])? {
//!     println!("{}", row["email"]);
//! }
//! # Ok::<(), litequery::LiteQueryError>(())
//! ```

use crate::clauses::{Clauses, Filter, Record};
use crate::connector::Connector;
use crate::core::db::{ArrayRow, BindValue, Fetched, HashRow, QueryExecutor, Shape};
use crate::core::{LiteQueryError, Result};
use crate::pager::{PageRequest, Pager};
use crate::sql::Statement;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Query state for one table.
///
/// The pager of a paginating result set is computed on first use and then
/// cached for the lifetime of the instance.
#[derive(Debug, Clone)]
pub struct ResultSet {
    table: String,
    filter: Filter,
    clauses: Clauses,
    connector: Connector,
    pager: OnceCell<Pager>,
}

/// Equality compares the table and the query state only.
impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.filter == other.filter && self.clauses == other.clauses
    }
}

impl ResultSet {
    pub(crate) fn new(connector: Connector, table: String) -> Self {
        ResultSet {
            table,
            filter: Filter::new(),
            clauses: Clauses::new(),
            connector,
            pager: OnceCell::new(),
        }
    }

    fn with_state(&self, filter: Filter, clauses: Clauses) -> Self {
        ResultSet {
            table: self.table.clone(),
            filter,
            clauses,
            connector: self.connector.clone(),
            pager: OnceCell::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn clauses(&self) -> &Clauses {
        &self.clauses
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn is_paginating(&self) -> bool {
        self.clauses.is_paginating()
    }

    /// Returns a new result set with `filter` laid over this one's filter and
    /// `clauses` merged into this one's clauses.
    ///
    /// Same-keyed conditions are replaced, not combined: searching twice on
    /// one column keeps only the second condition.
    pub fn search(&self, filter: impl Into<Filter>, clauses: Clauses) -> ResultSet {
        let filter = self.filter.merge(&filter.into());
        let clauses = self.clauses.merge(&clauses);
        self.with_state(filter, clauses)
    }

    /// `search` with a filter only
    pub fn refine(&self, filter: impl Into<Filter>) -> ResultSet {
        self.search(filter, Clauses::new())
    }

    fn page_request(&self) -> Result<Option<PageRequest>> {
        PageRequest::from_clauses(&self.clauses, self.connector.default_rows())
    }

    /// Translates the query state into a SELECT of `fields`.
    ///
    /// With a `page` clause the page window sets LIMIT and OFFSET and the
    /// `limit`/`offset` clauses are ignored.
    pub fn select_sql(&self, fields: &[&str]) -> Result<Statement> {
        let (limit, offset) = match self.page_request()? {
            Some(request) => (Some(request.limit()), Some(request.offset())),
            None => (self.clauses.limit, self.clauses.offset),
        };
        let order_by = self.clauses.order_by.as_deref().unwrap_or(&[]);
        self.connector
            .sql()
            .select(&self.table, fields, &self.filter, order_by, limit, offset)
    }

    /// Runs the SELECT and returns the rows in the requested shape.
    pub fn fetch(&self, shape: Shape, fields: &[&str]) -> Result<Fetched> {
        let (sql, binds) = self.select_sql(fields)?;
        self.connector.fetch(&shape, &sql, &binds)
    }

    pub fn array_row(&self, fields: &[&str]) -> Result<Option<ArrayRow>> {
        self.fetch(Shape::ArrayRow, fields)?.into_array_row()
    }

    pub fn hash_row(&self, fields: &[&str]) -> Result<Option<HashRow>> {
        self.fetch(Shape::HashRow, fields)?.into_hash_row()
    }

    pub fn array_of_array_rows(&self, fields: &[&str]) -> Result<Vec<ArrayRow>> {
        self.fetch(Shape::ArrayOfArrayRows, fields)?.into_array_of_array_rows()
    }

    pub fn array_of_hash_rows(&self, fields: &[&str]) -> Result<Vec<HashRow>> {
        self.fetch(Shape::ArrayOfHashRows, fields)?.into_array_of_hash_rows()
    }

    /// Rows keyed by the value of their `key` column.
    ///
    /// When several rows share a key value the last one in result order wins.
    /// `key` must be one of `fields` (or `fields` must be empty).
    pub fn hash_of_hash_rows(&self, key: &str, fields: &[&str]) -> Result<BTreeMap<String, HashRow>> {
        let shape = Shape::HashOfHashRows {
            key: key.to_string(),
        };
        self.fetch(shape, fields)?.into_hash_of_hash_rows()
    }

    /// Values of one column across all matching rows
    pub fn column(&self, name: &str) -> Result<Vec<Value>> {
        self.fetch(Shape::Column, &[name])?.into_column()
    }

    /// Number of matching rows.
    ///
    /// A paginating result set returns the number of entries on its page,
    /// taken from the cached pager.
    pub fn count(&self) -> Result<u64> {
        if self.is_paginating() {
            return Ok(self.pager()?.entries_on_this_page());
        }
        let (sql, binds) = self.connector.sql().count(&self.table, &self.filter)?;
        let total = self
            .connector
            .fetch(&Shape::Scalar, &sql, &binds)?
            .into_scalar()?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(total)
    }

    /// The pager of a paginating result set, built on first access.
    ///
    /// # Errors
    ///
    /// `LiteQueryError::Usage` when the result set has no `page` clause.
    pub fn pager(&self) -> Result<&Pager> {
        self.pager.get_or_try_init(|| {
            let request = self.page_request()?.ok_or_else(|| {
                LiteQueryError::usage(format!(
                    "pager requested on `{}` without a page clause",
                    self.table
                ))
            })?;
            let unpaged = self.with_state(self.filter.clone(), self.clauses.without_page());
            let total = unpaged.count()?;
            debug!(table = %self.table, total, page = request.page(), "built pager");
            Ok(Pager::new(total, request))
        })
    }

    /// Inserts one row. The filter does not apply.
    pub fn insert(&self, record: &Record) -> Result<usize> {
        let (sql, binds) = self.connector.sql().insert(&self.table, record)?;
        self.connector.execute(&sql, &binds)
    }

    /// Inserts one row and returns its generated rowid.
    pub fn insert_returning_id(&self, record: &Record) -> Result<i64> {
        let manager = self.connector.manager();
        if !manager.backend().supports_last_insert_id() {
            return Err(LiteQueryError::Unsupported(format!(
                "cannot read generated keys from {}",
                manager.dsn().driver
            )));
        }
        let (sql, binds) = self.connector.sql().insert(&self.table, record)?;
        manager.run(|conn| {
            QueryExecutor::new(conn).execute(&sql, &binds)?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Updates the matching rows; returns how many changed.
    pub fn update(&self, record: &Record) -> Result<usize> {
        let (sql, binds) = self.connector.sql().update(&self.table, record, &self.filter)?;
        self.connector.execute(&sql, &binds)
    }

    /// Deletes the matching rows; returns how many were removed.
    pub fn delete(&self) -> Result<usize> {
        let (sql, binds) = self.connector.sql().delete(&self.table, &self.filter)?;
        self.connector.execute(&sql, &binds)
    }

    /// Prepares the SELECT once for repeated execution.
    ///
    /// Returns the statement and the values for its placeholders.
    pub fn select_sth(&self, fields: &[&str]) -> Result<(PreparedStatement, Vec<BindValue>)> {
        let (sql, binds) = self.select_sql(fields)?;
        Ok((PreparedStatement::prepare(self.connector.clone(), sql)?, binds))
    }

    /// Prepares an INSERT taking one value per field, in order.
    pub fn insert_sth(&self, fields: &[&str]) -> Result<PreparedStatement> {
        let sql = self.connector.sql().insert_template(&self.table, fields)?;
        PreparedStatement::prepare(self.connector.clone(), sql)
    }
}

/// A statement held in the connection's statement cache.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    connector: Connector,
    sql: String,
}

impl PreparedStatement {
    fn prepare(connector: Connector, sql: String) -> Result<Self> {
        connector.prepare(&sql)?;
        Ok(PreparedStatement { connector, sql })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn execute(&self, binds: &[BindValue]) -> Result<usize> {
        self.connector.execute(&self.sql, binds)
    }

    pub fn fetch(&self, shape: &Shape, binds: &[BindValue]) -> Result<Fetched> {
        self.connector.fetch(shape, &self.sql, binds)
    }
}
