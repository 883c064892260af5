//! SQLite database backend using `rusqlite`.
//!
//! [`SqliteBackend`] implements [`DatabaseBackend`](crate::base::DatabaseBackend)
//! with `rusqlite`, wrapped in `tokio::task::spawn_blocking` for async
//! compatibility.
//!
//! - WAL mode enabled for file-based databases
//! - In-memory database support via `:memory:` (used heavily by tests)
//! - A single connection behind an async `Mutex`

use std::path::PathBuf;
use std::sync::Arc;

use migraph_core::MigraphError;
use tokio::sync::Mutex;

use crate::base::DatabaseBackend;
use crate::row::Row;
use crate::value::Value;

/// A SQLite database backend.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection alias.
    alias: String,
    /// The connection, guarded by an async mutex.
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MigraphError> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| MigraphError::OperationalError(format!("SQLite open failed: {e}")))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas).map_err(|e| {
            MigraphError::OperationalError(format!("Failed to set pragmas: {e}"))
        })?;

        tracing::debug!(path = %path.display(), "opened sqlite database");

        Ok(Self {
            path,
            alias: "default".to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> Result<Self, MigraphError> {
        Self::open(":memory:")
    }

    /// Sets the connection alias reported by [`DatabaseBackend::alias`].
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Binds `Value`s to a `rusqlite` statement.
    fn bind_params(
        stmt: &mut rusqlite::Statement<'_>,
        params: &[Value],
    ) -> Result<(), MigraphError> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::DateTime(_) => stmt.raw_bind_parameter(idx, param.to_string().as_str()),
            }
            .map_err(|e| MigraphError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to a backend-agnostic [`Row`].
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                match sqlite_row.get_ref(i).unwrap_or(rusqlite::types::ValueRef::Null) {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for SqliteBackend {
    fn vendor(&self) -> &str {
        "sqlite"
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigraphError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| MigraphError::DatabaseError(format!("{e}")))?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt
                .raw_execute()
                .map_err(|e| MigraphError::DatabaseError(format!("{e}")))?;
            Ok(count as u64)
        })
        .await
        .map_err(|e| MigraphError::DatabaseError(format!("Task join error: {e}")))?
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, MigraphError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| MigraphError::DatabaseError(format!("{e}")))?;

            let column_names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows
                .next()
                .map_err(|e| MigraphError::DatabaseError(format!("{e}")))?
            {
                rows.push(Self::convert_row(row, &column_names));
            }

            Ok(rows)
        })
        .await
        .map_err(|e| MigraphError::DatabaseError(format!("Task join error: {e}")))?
    }

    async fn table_names(&self) -> Result<Vec<String>, MigraphError> {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await?;
        rows.iter().map(|row| row.get::<String>("name")).collect()
    }

    async fn begin(&self) -> Result<(), MigraphError> {
        self.execute("BEGIN", &[]).await?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), MigraphError> {
        self.execute("COMMIT", &[]).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), MigraphError> {
        self.execute("ROLLBACK", &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_memory_open() {
        let backend = SqliteBackend::memory().unwrap().with_alias("replica");
        assert_eq!(backend.vendor(), "sqlite");
        assert_eq!(backend.alias(), "replica");
    }

    #[tokio::test]
    async fn test_sqlite_insert_and_query() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
                &[],
            )
            .await
            .unwrap();

        backend
            .execute(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[Value::from("Alice"), Value::from(30)],
            )
            .await
            .unwrap();

        let rows = backend
            .query("SELECT id, name, age FROM users", &[])
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get::<i64>("age").unwrap(), 30);
    }

    #[tokio::test]
    async fn test_sqlite_query_one_errors() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)", &[])
            .await
            .unwrap();

        let none = backend.query_one("SELECT val FROM t", &[]).await;
        assert!(matches!(none, Err(MigraphError::DoesNotExist(_))));

        for v in ["a", "b"] {
            backend
                .execute("INSERT INTO t (val) VALUES (?)", &[Value::from(v)])
                .await
                .unwrap();
        }
        let many = backend.query_one("SELECT val FROM t", &[]).await;
        assert!(matches!(many, Err(MigraphError::MultipleObjectsReturned(_))));
    }

    #[tokio::test]
    async fn test_sqlite_table_names() {
        let backend = SqliteBackend::memory().unwrap();
        assert!(backend.table_names().await.unwrap().is_empty());

        backend.execute("CREATE TABLE zeta (id INTEGER)", &[]).await.unwrap();
        backend.execute("CREATE TABLE alpha (id INTEGER)", &[]).await.unwrap();

        assert_eq!(backend.table_names().await.unwrap(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_sqlite_rollback_discards_changes() {
        let backend = SqliteBackend::memory().unwrap();
        backend.begin().await.unwrap();
        backend.execute("CREATE TABLE temp_t (id INTEGER)", &[]).await.unwrap();
        backend.rollback().await.unwrap();
        assert!(backend.table_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_invalid_sql() {
        let backend = SqliteBackend::memory().unwrap();
        let result = backend.execute("CREAT TABLE broken", &[]).await;
        assert!(matches!(result, Err(MigraphError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_sqlite_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.execute("CREATE TABLE kept (id INTEGER)", &[]).await.unwrap();
        }
        let reopened = SqliteBackend::open(&path).unwrap();
        assert_eq!(reopened.table_names().await.unwrap(), vec!["kept"]);
        assert_eq!(reopened.path(), &path);
    }
}
