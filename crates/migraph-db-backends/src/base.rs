//! Base database backend trait and connection configuration.
//!
//! This module defines the [`DatabaseBackend`] trait that all backend
//! implementations must satisfy, and [`connect`], which opens a backend from
//! project settings.

use migraph_core::{DatabaseSettings, MigraphError};

use crate::row::Row;
use crate::value::Value;

/// The core trait for database backends.
///
/// All methods are async because database operations are I/O-bound. Backends
/// that use synchronous drivers (like `rusqlite`) wrap operations in
/// `spawn_blocking` to keep the async interface.
#[async_trait::async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Returns the vendor name (e.g., "sqlite").
    fn vendor(&self) -> &str;

    /// Returns the connection alias this backend was opened under.
    fn alias(&self) -> &str;

    /// Executes a SQL statement that does not return rows.
    ///
    /// Returns the number of rows affected.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigraphError>;

    /// Executes a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, MigraphError>;

    /// Executes a SQL query and returns exactly one row.
    ///
    /// Returns [`MigraphError::DoesNotExist`] if no rows are returned, or
    /// [`MigraphError::MultipleObjectsReturned`] if more than one row is returned.
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, MigraphError> {
        let rows = self.query(sql, params).await?;
        let count = rows.len();
        let mut rows = rows.into_iter();
        match (rows.next(), count) {
            (Some(row), 1) => Ok(row),
            (None, _) => Err(MigraphError::DoesNotExist("No rows returned".to_string())),
            _ => Err(MigraphError::MultipleObjectsReturned(format!(
                "Expected 1 row, got {count}"
            ))),
        }
    }

    /// Returns the names of all tables in the database, sorted.
    async fn table_names(&self) -> Result<Vec<String>, MigraphError>;

    /// Begins a new transaction.
    async fn begin(&self) -> Result<(), MigraphError>;

    /// Commits the current transaction.
    async fn commit(&self) -> Result<(), MigraphError>;

    /// Rolls back the current transaction.
    async fn rollback(&self) -> Result<(), MigraphError>;
}

/// Configuration for opening a database connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// The alias the connection is known by (e.g. "default").
    pub alias: String,
    /// The engine name (e.g. "sqlite").
    pub engine: String,
    /// The database name or file path.
    pub name: String,
}

impl DatabaseConfig {
    /// Builds a configuration from settings for the given alias.
    pub fn from_settings(alias: impl Into<String>, settings: &DatabaseSettings) -> Self {
        Self {
            alias: alias.into(),
            engine: settings.engine.clone(),
            name: settings.name.clone(),
        }
    }

    /// Creates a configuration for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self {
            alias: "default".to_string(),
            engine: "sqlite".to_string(),
            name: ":memory:".to_string(),
        }
    }
}

/// Opens a backend for the given configuration.
///
/// Fails with [`MigraphError::ImproperlyConfigured`] when the engine is
/// unknown or was not compiled in.
pub fn connect(config: &DatabaseConfig) -> Result<Box<dyn DatabaseBackend>, MigraphError> {
    match config.engine.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" | "sqlite3" => Ok(Box::new(
            crate::sqlite::SqliteBackend::open(&config.name)?.with_alias(&config.alias),
        )),
        other => Err(MigraphError::ImproperlyConfigured(format!(
            "Database engine '{other}' is not available (database '{}')",
            config.alias
        ))),
    }
}
