// Core infrastructure modules
pub mod core;

// Query building and execution
pub mod clauses;
pub mod config;
pub mod connector;
pub mod pager;
pub mod resultset;
pub mod sql;

#[cfg(test)]
mod test_utils;

pub use crate::clauses::{Clauses, Direction, Filter, Order, Record};
pub use crate::connector::{ConnectSource, Connector};
pub use crate::core::db::{ArrayRow, BindValue, Fetched, HashRow, Shape};
pub use crate::core::{LiteQueryError, Result};
pub use crate::pager::Pager;
pub use crate::resultset::{PreparedStatement, ResultSet};
pub use crate::sql::SqlBuilder;
