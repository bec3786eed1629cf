/// Query Execution Module
///
/// Executes prepared statements and shapes the raw rows into result values.
/// Each shaping strategy is one `Shape` variant and produces the matching
/// `Fetched` variant.

use crate::core::{LiteQueryError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::debug;

/// A value bound to a statement placeholder
pub type BindValue = rusqlite::types::Value;

/// A row as a sequence of column values
pub type ArrayRow = Vec<JsonValue>;

/// A row keyed by column name
pub type HashRow = serde_json::Map<String, JsonValue>;

/// How the rows of a SELECT are returned to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// First row as a sequence
    ArrayRow,
    /// First row keyed by column name
    HashRow,
    ArrayOfArrayRows,
    ArrayOfHashRows,
    /// Every row keyed by column name, indexed by the value of `key`
    HashOfHashRows { key: String },
    /// First column of every row
    Column,
    /// First column of the first row
    Scalar,
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::ArrayRow => "array_row",
            Shape::HashRow => "hash_row",
            Shape::ArrayOfArrayRows => "array_of_array_rows",
            Shape::ArrayOfHashRows => "array_of_hash_rows",
            Shape::HashOfHashRows { .. } => "hash_of_hash_rows",
            Shape::Column => "column",
            Shape::Scalar => "scalar",
        }
    }
}

/// Rows returned by a fetch, one variant per `Shape`
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    ArrayRow(Option<ArrayRow>),
    HashRow(Option<HashRow>),
    ArrayOfArrayRows(Vec<ArrayRow>),
    ArrayOfHashRows(Vec<HashRow>),
    HashOfHashRows(BTreeMap<String, HashRow>),
    Column(Vec<JsonValue>),
    Scalar(Option<JsonValue>),
}

impl Fetched {
    pub fn shape_name(&self) -> &'static str {
        match self {
            Fetched::ArrayRow(_) => "array_row",
            Fetched::HashRow(_) => "hash_row",
            Fetched::ArrayOfArrayRows(_) => "array_of_array_rows",
            Fetched::ArrayOfHashRows(_) => "array_of_hash_rows",
            Fetched::HashOfHashRows(_) => "hash_of_hash_rows",
            Fetched::Column(_) => "column",
            Fetched::Scalar(_) => "scalar",
        }
    }

    fn mismatch(self, expected: &str) -> LiteQueryError {
        LiteQueryError::usage(format!(
            "expected a {} result, got {}",
            expected,
            self.shape_name()
        ))
    }

    pub fn into_array_row(self) -> Result<Option<ArrayRow>> {
        match self {
            Fetched::ArrayRow(row) => Ok(row),
            other => Err(other.mismatch("array_row")),
        }
    }

    pub fn into_hash_row(self) -> Result<Option<HashRow>> {
        match self {
            Fetched::HashRow(row) => Ok(row),
            other => Err(other.mismatch("hash_row")),
        }
    }

    pub fn into_array_of_array_rows(self) -> Result<Vec<ArrayRow>> {
        match self {
            Fetched::ArrayOfArrayRows(rows) => Ok(rows),
            other => Err(other.mismatch("array_of_array_rows")),
        }
    }

    pub fn into_array_of_hash_rows(self) -> Result<Vec<HashRow>> {
        match self {
            Fetched::ArrayOfHashRows(rows) => Ok(rows),
            other => Err(other.mismatch("array_of_hash_rows")),
        }
    }

    pub fn into_hash_of_hash_rows(self) -> Result<BTreeMap<String, HashRow>> {
        match self {
            Fetched::HashOfHashRows(rows) => Ok(rows),
            other => Err(other.mismatch("hash_of_hash_rows")),
        }
    }

    pub fn into_column(self) -> Result<Vec<JsonValue>> {
        match self {
            Fetched::Column(values) => Ok(values),
            other => Err(other.mismatch("column")),
        }
    }

    pub fn into_scalar(self) -> Result<Option<JsonValue>> {
        match self {
            Fetched::Scalar(value) => Ok(value),
            other => Err(other.mismatch("scalar")),
        }
    }
}

/// Query execution service that operates on a database connection
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        QueryExecutor { connection }
    }

    /// Executes a statement that returns no rows.
    ///
    /// # Returns
    ///
    /// The number of rows changed.
    pub fn execute(&self, sql: &str, binds: &[BindValue]) -> Result<usize> {
        debug!(%sql, binds = binds.len(), "execute");
        let mut stmt = self.connection.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(binds.iter()))?)
    }

    /// Runs a query and shapes its rows as requested.
    ///
    /// # Errors
    ///
    /// `LiteQueryError::Database` for anything SQLite rejects, and
    /// `LiteQueryError::Usage` when a `HashOfHashRows` key is not a selected column.
    pub fn fetch(&self, shape: &Shape, sql: &str, binds: &[BindValue]) -> Result<Fetched> {
        debug!(%sql, binds = binds.len(), shape = shape.name(), "fetch");
        let mut stmt = self.connection.prepare_cached(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let key_index = match shape {
            Shape::HashOfHashRows { key } => Some(
                key_column(&columns, key)
                    .ok_or_else(|| {
                        LiteQueryError::usage(format!(
                            "key column `{}` is not among the selected fields",
                            key
                        ))
                    })?,
            ),
            _ => None,
        };

        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let fetched = match shape {
            Shape::ArrayRow => {
                let row = match rows.next()? {
                    Some(row) => Some(array_row(row, columns.len())?),
                    None => None,
                };
                Fetched::ArrayRow(row)
            }
            Shape::HashRow => {
                let row = match rows.next()? {
                    Some(row) => Some(hash_row(row, &columns)?),
                    None => None,
                };
                Fetched::HashRow(row)
            }
            Shape::ArrayOfArrayRows => {
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(array_row(row, columns.len())?);
                }
                Fetched::ArrayOfArrayRows(out)
            }
            Shape::ArrayOfHashRows => {
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(hash_row(row, &columns)?);
                }
                Fetched::ArrayOfHashRows(out)
            }
            Shape::HashOfHashRows { .. } => {
                let index = key_index.unwrap_or_default();
                let mut out = BTreeMap::new();
                while let Some(row) = rows.next()? {
                    let key = key_string(&to_json(row.get_ref(index)?));
                    // later rows replace earlier rows with the same key
                    out.insert(key, hash_row(row, &columns)?);
                }
                Fetched::HashOfHashRows(out)
            }
            Shape::Column => {
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(to_json(row.get_ref(0)?));
                }
                Fetched::Column(out)
            }
            Shape::Scalar => {
                let value = match rows.next()? {
                    Some(row) => Some(to_json(row.get_ref(0)?)),
                    None => None,
                };
                Fetched::Scalar(value)
            }
        };
        Ok(fetched)
    }
}

fn array_row(row: &Row<'_>, width: usize) -> rusqlite::Result<ArrayRow> {
    (0..width).map(|i| row.get_ref(i).map(to_json)).collect()
}

fn hash_row(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<HashRow> {
    let mut out = HashRow::new();
    for (i, name) in columns.iter().enumerate() {
        out.insert(name.clone(), to_json(row.get_ref(i)?));
    }
    Ok(out)
}

/// Converts a SQLite value to JSON.
///
/// Non-finite reals become `null`; blobs become arrays of bytes.
pub fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
    }
}

/// Converts a JSON value to a statement bind value.
///
/// Booleans bind as 0/1; arrays and objects bind as their JSON text.
pub fn to_bind(value: &JsonValue) -> BindValue {
    match value {
        JsonValue::Null => BindValue::Null,
        JsonValue::Bool(b) => BindValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => BindValue::Integer(i),
            None => n.as_f64().map(BindValue::Real).unwrap_or(BindValue::Null),
        },
        JsonValue::String(s) => BindValue::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => BindValue::Text(value.to_string()),
    }
}

/// Finds `key` among the result columns.
///
/// SQLite names a selected `table.column` by its bare column, so a qualified
/// key falls back to its last segment.
fn key_column(columns: &[String], key: &str) -> Option<usize> {
    columns.iter().position(|c| c == key).or_else(|| {
        let (_, bare) = key.rsplit_once('.')?;
        columns.iter().position(|c| c == bare)
    })
}

/// Renders a column value as a mapping key.
pub fn key_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_test_table(conn: &Connection) {
        conn.execute_batch(
            "
            CREATE TABLE test (
                id INTEGER PRIMARY KEY,
                name TEXT,
                value REAL,
                active BOOLEAN DEFAULT 1
            );
            INSERT INTO test (name, value) VALUES ('Alice', 123.45);
            INSERT INTO test (name, value) VALUES ('Bob', 678.90);
            INSERT INTO test (name, value) VALUES (NULL, NULL);
        ",
        )
        .unwrap();
    }

    #[test]
    fn test_fetch_array_and_hash_rows() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        let rows = executor
            .fetch(&Shape::ArrayOfArrayRows, "SELECT id, name FROM test ORDER BY id", &[])
            .unwrap()
            .into_array_of_array_rows()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![json!(1), json!("Alice")]);
        assert_eq!(rows[2], vec![json!(3), JsonValue::Null]);

        let row = executor
            .fetch(&Shape::HashRow, "SELECT name, value FROM test WHERE id = ?", &[BindValue::Integer(2)])
            .unwrap()
            .into_hash_row()
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], json!("Bob"));
        assert_eq!(row["value"], json!(678.90));
    }

    #[test]
    fn test_single_row_without_match_is_none() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        let fetched = executor
            .fetch(&Shape::ArrayRow, "SELECT * FROM test WHERE id = 99", &[])
            .unwrap();
        assert_eq!(fetched, Fetched::ArrayRow(None));
    }

    #[test]
    fn test_hash_of_hash_rows_last_row_wins() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (k TEXT, n INTEGER);
             INSERT INTO t VALUES ('a', 1), ('b', 2), ('a', 3);",
        )
        .unwrap();
        let executor = QueryExecutor::new(&conn);

        let keyed = executor
            .fetch(
                &Shape::HashOfHashRows { key: "k".to_string() },
                "SELECT k, n FROM t ORDER BY n",
                &[],
            )
            .unwrap()
            .into_hash_of_hash_rows()
            .unwrap();
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["a"]["n"], json!(3));

        let missing = executor.fetch(&Shape::HashOfHashRows { key: "x".to_string() }, "SELECT k FROM t", &[]);
        assert!(matches!(missing, Err(LiteQueryError::Usage(_))));
    }

    #[test]
    fn test_hash_of_hash_rows_qualified_key() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        let shape = Shape::HashOfHashRows {
            key: "test.name".to_string(),
        };
        let keyed = executor
            .fetch(&shape, "SELECT test.name, test.value FROM test WHERE id < 3", &[])
            .unwrap()
            .into_hash_of_hash_rows()
            .unwrap();
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["Alice"]["value"], json!(123.45));

        let missing = Shape::HashOfHashRows {
            key: "test.id".to_string(),
        };
        assert!(matches!(
            executor.fetch(&missing, "SELECT name FROM test", &[]),
            Err(LiteQueryError::Usage(_))
        ));
    }

    #[test]
    fn test_query_error_handling() {
        let conn = Connection::open_in_memory().unwrap();
        let executor = QueryExecutor::new(&conn);
        match executor.fetch(&Shape::Scalar, "SELECT * FROM nonexistent_table", &[]) {
            Err(LiteQueryError::Database(e)) => assert!(e.to_string().contains("no such table")),
            other => panic!("Expected Database error, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let err = Fetched::Column(vec![]).into_scalar().unwrap_err();
        assert!(err.to_string().contains("expected a scalar result, got column"));
    }

    #[test]
    fn test_blob_handling() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE blobs (id INTEGER, data BLOB)", []).unwrap();
        conn.execute("INSERT INTO blobs VALUES (1, X'4869')", []).unwrap();

        let value = QueryExecutor::new(&conn)
            .fetch(&Shape::Scalar, "SELECT data FROM blobs WHERE id = 1", &[])
            .unwrap()
            .into_scalar()
            .unwrap();
        assert_eq!(value, Some(json!([72, 105])));
    }

    #[test]
    fn test_bind_conversion() {
        assert_eq!(to_bind(&json!(true)), BindValue::Integer(1));
        assert_eq!(to_bind(&json!(2.5)), BindValue::Real(2.5));
        assert_eq!(to_bind(&json!("x")), BindValue::Text("x".to_string()));
        assert_eq!(to_bind(&json!([1, 2])), BindValue::Text("[1,2]".to_string()));
        assert_eq!(key_string(&json!(7)), "7");
    }
}
