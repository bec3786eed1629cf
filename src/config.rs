use crate::core::db::ConnectOptions;
use crate::core::{LiteQueryError, Result};
use crate::pager::DEFAULT_ENTRIES_PER_PAGE;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sql: Option<SqlConfig>,
    pub paging: Option<PagingConfig>,
}

/// Connection settings.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub statement_cache_capacity: Option<usize>,
    pub pragmas: Option<Vec<String>>,
}

/// SQL generation settings.
#[derive(Debug, Deserialize)]
pub struct SqlConfig {
    pub quote_char: Option<char>,
}

/// Pagination defaults.
#[derive(Debug, Deserialize)]
pub struct PagingConfig {
    pub rows: Option<u64>,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| LiteQueryError::Config(e.to_string()))?;
        if config.database.dsn.trim().is_empty() {
            return Err(LiteQueryError::Config("database.dsn must not be empty".to_string()));
        }
        if config.default_rows() == 0 {
            return Err(LiteQueryError::Config("paging.rows must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            busy_timeout: self.database.busy_timeout_ms.map(Duration::from_millis),
            statement_cache_capacity: self.database.statement_cache_capacity,
            pragmas: self.database.pragmas.clone().unwrap_or_default(),
        }
    }

    pub fn quote_char(&self) -> Option<char> {
        self.sql.as_ref().and_then(|s| s.quote_char)
    }

    pub fn default_rows(&self) -> u64 {
        self.paging
            .as_ref()
            .and_then(|p| p.rows)
            .unwrap_or(DEFAULT_ENTRIES_PER_PAGE)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = litequery::config::load_config("litequery.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}
