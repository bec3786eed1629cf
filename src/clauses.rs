//! Query state carried by a result set: the filter conditions, the values
//! written by insert/update, and the auxiliary clauses (ordering, limits and
//! pagination).
//!
//! All of these are plain values. Merging two of them always builds a new
//! value and leaves both inputs untouched.

use crate::core::{LiteQueryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Conditions keyed by column or expression, combined with AND.
///
/// Keys are kept sorted so the generated SQL is the same on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Filter(BTreeMap::new())
    }

    /// Adds (or replaces) the condition for `key`.
    pub fn and(mut self, key: impl Into<String>, condition: impl Into<Value>) -> Self {
        self.0.insert(key.into(), condition.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns a new filter with `other`'s keys laid over this one.
    ///
    /// A key present in both takes `other`'s condition; the earlier condition
    /// on that key is dropped, not combined.
    pub fn merge(&self, other: &Filter) -> Filter {
        let mut merged = self.0.clone();
        for (key, condition) in &other.0 {
            merged.insert(key.clone(), condition.clone());
        }
        Filter(merged)
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Filter(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Filter(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl TryFrom<Value> for Filter {
    type Error = LiteQueryError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into()),
            Value::Null => Ok(Filter::new()),
            other => Err(LiteQueryError::usage(format!(
                "a filter must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// Column values written by insert and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl TryFrom<Value> for Record {
    type Error = LiteQueryError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(LiteQueryError::usage(format!(
                "a record must be a JSON object, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Order {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Order {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// `"name"` sorts ascending, `"-name"` descending.
impl From<&str> for Order {
    fn from(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(column) => Order::desc(column),
            None => Order::asc(spec),
        }
    }
}

/// Auxiliary query directives.
///
/// `page` switches the result set into pagination mode; `rows` is the page
/// size. While `page` is set, `limit` and `offset` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Clauses {
    #[serde(default)]
    pub order_by: Option<Vec<Order>>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub rows: Option<u64>,
}

impl Clauses {
    pub fn new() -> Self {
        Clauses::default()
    }

    pub fn order_by<I, O>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Order>,
    {
        self.order_by = Some(terms.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Returns the union of both clause sets; `other` wins on every key it sets.
    pub fn merge(&self, other: &Clauses) -> Clauses {
        Clauses {
            order_by: other.order_by.clone().or_else(|| self.order_by.clone()),
            limit: other.limit.or(self.limit),
            offset: other.offset.or(self.offset),
            page: other.page.or(self.page),
            rows: other.rows.or(self.rows),
        }
    }

    /// A copy with pagination switched off
    pub fn without_page(&self) -> Clauses {
        Clauses {
            page: None,
            ..self.clone()
        }
    }

    pub fn is_paginating(&self) -> bool {
        self.page.is_some()
    }
}
