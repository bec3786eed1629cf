//! SQL generation.
//!
//! `SqlBuilder` turns a table name, a `Filter` and the clause values into a
//! statement with `?` placeholders plus the values to bind, in placeholder
//! order. Filter keys are emitted in sorted order so identical inputs always
//! yield identical SQL.
//!
//! Condition grammar for one filter key:
//!
//! | condition                      | SQL                               |
//! |--------------------------------|-----------------------------------|
//! | `5`, `"x"`, `true`             | `col = ?`                         |
//! | `null`                         | `col IS NULL`                     |
//! | `[1, 2]`                       | `( col = ? OR col = ? )`          |
//! | `{">=": 18}`                   | `col >= ?`                        |
//! | `{"-in": [1, 2]}`              | `col IN ( ?, ? )`                 |
//! | `{"-between": [1, 9]}`         | `col BETWEEN ? AND ?`             |
//! | `{"-sql": "IS NOT NULL"}`      | `col IS NOT NULL`                 |
//! | `{"-sql": ["> ?", 5]}`         | `col > ?`                         |
//!
//! The special keys `-or` and `-and` take an array of nested filter objects.

use crate::clauses::{Direction, Filter, Order, Record};
use crate::core::db::{to_bind, BindValue};
use crate::core::{LiteQueryError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static COMPARISON_OP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z <>=!]+$").unwrap());

/// A statement and the values bound to its placeholders
pub type Statement = (String, Vec<BindValue>);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlBuilder {
    quote_char: Option<char>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        SqlBuilder::default()
    }

    /// Quote identifiers with `quote` (e.g. `"`)
    pub fn with_quote_char(quote: char) -> Self {
        SqlBuilder {
            quote_char: Some(quote),
        }
    }

    pub fn quote_char(&self) -> Option<char> {
        self.quote_char
    }

    /// Builds a SELECT.
    ///
    /// An empty field list selects `*`. `offset` without `limit` renders
    /// `LIMIT -1` so SQLite accepts it.
    pub fn select(
        &self,
        table: &str,
        fields: &[&str],
        filter: &Filter,
        order_by: &[Order],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Statement> {
        let (where_sql, binds) = self.where_clause(filter)?;
        let mut sql = format!("SELECT {} FROM {}", self.field_list(fields), self.quote(table));
        sql.push_str(&where_sql);

        if !order_by.is_empty() {
            let terms: Vec<String> = order_by
                .iter()
                .map(|order| {
                    let direction = match order.direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    format!("{} {}", self.quote(&order.column), direction)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (limit, offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        Ok((sql, binds))
    }

    pub fn count(&self, table: &str, filter: &Filter) -> Result<Statement> {
        self.select(table, &["COUNT(*)"], filter, &[], None, None)
    }

    /// Builds an INSERT. An empty record inserts the column defaults.
    pub fn insert(&self, table: &str, record: &Record) -> Result<Statement> {
        if record.is_empty() {
            return Ok((format!("INSERT INTO {} DEFAULT VALUES", self.quote(table)), Vec::new()));
        }

        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut binds = Vec::new();
        for (column, value) in record.iter() {
            columns.push(self.quote(column));
            values.push(self.value_sql(value, &mut binds)?);
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            values.join(", ")
        );
        Ok((sql, binds))
    }

    /// INSERT with one placeholder per field, for repeated execution
    pub fn insert_template(&self, table: &str, fields: &[&str]) -> Result<String> {
        if fields.is_empty() {
            return Err(LiteQueryError::usage("an insert statement needs at least one field"));
        }
        let columns: Vec<String> = fields.iter().map(|f| self.quote(f)).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            placeholders
        ))
    }

    pub fn update(&self, table: &str, record: &Record, filter: &Filter) -> Result<Statement> {
        if record.is_empty() {
            return Err(LiteQueryError::usage("an update needs at least one column to set"));
        }

        let mut binds = Vec::new();
        let mut assignments = Vec::new();
        for (column, value) in record.iter() {
            let value = self.value_sql(value, &mut binds)?;
            assignments.push(format!("{} = {}", self.quote(column), value));
        }

        let (where_sql, where_binds) = self.where_clause(filter)?;
        binds.extend(where_binds);
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.quote(table),
            assignments.join(", "),
            where_sql
        );
        Ok((sql, binds))
    }

    pub fn delete(&self, table: &str, filter: &Filter) -> Result<Statement> {
        let (where_sql, binds) = self.where_clause(filter)?;
        Ok((format!("DELETE FROM {}{}", self.quote(table), where_sql), binds))
    }

    /// Renders ` WHERE ...` for `filter`, or an empty string when it has no keys.
    pub fn where_clause(&self, filter: &Filter) -> Result<Statement> {
        let mut binds = Vec::new();
        let parts = self.filter_parts(filter.iter(), &mut binds)?;
        if parts.is_empty() {
            return Ok((String::new(), binds));
        }
        Ok((format!(" WHERE {}", parts.join(" AND ")), binds))
    }

    fn filter_parts<'a, I>(&self, conditions: I, binds: &mut Vec<BindValue>) -> Result<Vec<String>>
    where
        I: Iterator<Item = (&'a String, &'a Value)>,
    {
        let mut parts = Vec::new();
        for (key, condition) in conditions {
            match key.as_str() {
                "-or" => parts.push(self.logic_group(condition, "OR", binds)?),
                "-and" => parts.push(self.logic_group(condition, "AND", binds)?),
                _ if key.starts_with('-') => {
                    return Err(LiteQueryError::usage(format!("unknown filter keyword `{}`", key)))
                }
                _ => parts.push(self.condition_sql(key, condition, binds)?),
            }
        }
        Ok(parts)
    }

    fn logic_group(&self, nested: &Value, joiner: &str, binds: &mut Vec<BindValue>) -> Result<String> {
        let branches = nested.as_array().ok_or_else(|| {
            LiteQueryError::usage(format!("-{} expects an array of filters", joiner.to_lowercase()))
        })?;

        let mut rendered = Vec::new();
        for branch in branches {
            let object = branch.as_object().ok_or_else(|| {
                LiteQueryError::usage(format!("-{} branches must be objects", joiner.to_lowercase()))
            })?;
            let mut keys: Vec<(&String, &Value)> = object.iter().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));
            let parts = self.filter_parts(keys.into_iter(), binds)?;
            if !parts.is_empty() {
                rendered.push(format!("( {} )", parts.join(" AND ")));
            }
        }

        if rendered.is_empty() {
            // an empty OR matches nothing, an empty AND everything
            return Ok(if joiner == "OR" { "0=1".to_string() } else { "1=1".to_string() });
        }
        Ok(format!("( {} )", rendered.join(&format!(" {} ", joiner))))
    }

    fn condition_sql(&self, key: &str, condition: &Value, binds: &mut Vec<BindValue>) -> Result<String> {
        let column = self.quote(key);
        match condition {
            Value::Null => Ok(format!("{} IS NULL", column)),
            Value::Array(values) => {
                if values.is_empty() {
                    return Ok("0=1".to_string());
                }
                let mut alternatives = Vec::new();
                for value in values {
                    alternatives.push(self.condition_sql(key, value, binds)?);
                }
                Ok(format!("( {} )", alternatives.join(" OR ")))
            }
            Value::Object(operators) => self.operators_sql(&column, operators, binds),
            scalar => {
                binds.push(to_bind(scalar));
                Ok(format!("{} = ?", column))
            }
        }
    }

    fn operators_sql(&self, column: &str, operators: &Map<String, Value>, binds: &mut Vec<BindValue>) -> Result<String> {
        let mut ops: Vec<(&String, &Value)> = operators.iter().collect();
        ops.sort_by(|a, b| a.0.cmp(b.0));

        let mut parts = Vec::new();
        for (op, operand) in ops {
            let normalized = op.trim().trim_start_matches('-').replace('_', " ").to_lowercase();
            let part = match normalized.as_str() {
                "in" | "not in" => self.in_sql(column, &normalized, operand, binds)?,
                "between" | "not between" => {
                    let bounds = operand.as_array().filter(|b| b.len() == 2).ok_or_else(|| {
                        LiteQueryError::usage(format!("-{} expects exactly two values", normalized.replace(' ', "_")))
                    })?;
                    binds.push(to_bind(&bounds[0]));
                    binds.push(to_bind(&bounds[1]));
                    format!("{} {} ? AND ?", column, normalized.to_uppercase())
                }
                "sql" => format!("{} {}", column, literal_sql(operand, binds)?),
                _ => {
                    if op.starts_with('-') && !matches!(normalized.as_str(), "like" | "not like" | "glob") {
                        return Err(LiteQueryError::usage(format!("unknown filter operator `{}`", op)));
                    }
                    if !COMPARISON_OP.is_match(&normalized) {
                        return Err(LiteQueryError::usage(format!("invalid filter operator `{}`", op)));
                    }
                    comparison_sql(column, &normalized, operand, binds)
                }
            };
            parts.push(part);
        }

        match parts.len() {
            0 => Ok("1=1".to_string()),
            1 => Ok(parts.remove(0)),
            _ => Ok(format!("( {} )", parts.join(" AND "))),
        }
    }

    fn in_sql(&self, column: &str, op: &str, operand: &Value, binds: &mut Vec<BindValue>) -> Result<String> {
        let keyword = op.to_uppercase();
        match operand {
            Value::Array(values) if values.is_empty() => {
                Ok(if op == "in" { "0=1".to_string() } else { "1=1".to_string() })
            }
            Value::Array(values) => {
                binds.extend(values.iter().map(to_bind));
                let placeholders = vec!["?"; values.len()].join(", ");
                Ok(format!("{} {} ( {} )", column, keyword, placeholders))
            }
            Value::Object(inner) if inner.contains_key("-sql") => {
                let subselect = literal_sql(&inner["-sql"], binds)?;
                Ok(format!("{} {} ( {} )", column, keyword, subselect))
            }
            scalar => {
                binds.push(to_bind(scalar));
                Ok(format!("{} {} ( ? )", column, keyword))
            }
        }
    }

    fn value_sql(&self, value: &Value, binds: &mut Vec<BindValue>) -> Result<String> {
        match value {
            Value::Object(inner) if inner.len() == 1 && inner.contains_key("-sql") => {
                literal_sql(&inner["-sql"], binds)
            }
            other => {
                binds.push(to_bind(other));
                Ok("?".to_string())
            }
        }
    }

    fn field_list(&self, fields: &[&str]) -> String {
        if fields.is_empty() {
            return "*".to_string();
        }
        fields.iter().map(|f| self.quote(f)).collect::<Vec<_>>().join(", ")
    }

    /// Quotes an identifier when a quote character is configured.
    ///
    /// Expressions such as `COUNT(*)` or `lower(name)` are left as written.
    /// Any other name is quoted whole, spaces included.
    pub fn quote(&self, identifier: &str) -> String {
        let quote = match self.quote_char {
            Some(q) => q,
            None => return identifier.to_string(),
        };
        if identifier == "*" || identifier.contains(&['(', '*'][..]) {
            return identifier.to_string();
        }
        identifier
            .split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    let escaped = part.replace(quote, &format!("{0}{0}", quote));
                    format!("{0}{1}{0}", quote, escaped)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn comparison_sql(column: &str, op: &str, operand: &Value, binds: &mut Vec<BindValue>) -> String {
    let op = op.to_uppercase();
    match (op.as_str(), operand) {
        ("=", Value::Null) => format!("{} IS NULL", column),
        ("!=" | "<>", Value::Null) => format!("{} IS NOT NULL", column),
        _ => {
            binds.push(to_bind(operand));
            format!("{} {} ?", column, op)
        }
    }
}

/// Literal SQL: a string is used as-is, an array is SQL followed by its binds.
fn literal_sql(operand: &Value, binds: &mut Vec<BindValue>) -> Result<String> {
    match operand {
        Value::String(sql) => Ok(sql.clone()),
        Value::Array(parts) => match parts.split_first() {
            Some((Value::String(sql), values)) => {
                binds.extend(values.iter().map(to_bind));
                Ok(sql.clone())
            }
            _ => Err(LiteQueryError::usage("-sql arrays start with the SQL text")),
        },
        other => Err(LiteQueryError::usage(format!("-sql expects a string or array, got {}", other))),
    }
}
