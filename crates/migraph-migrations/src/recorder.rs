//! The applied-migrations ledger.
//!
//! [`MigrationRecorder`] keeps one row per applied migration in a dedicated
//! table. The table is outside the migration system itself, so the recorder
//! creates it on first write. Its shape is described by an explicit
//! [`LedgerSchema`] built once and shared by reference.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Utc};
use migraph_core::settings::DEFAULT_MIGRATIONS_TABLE;
use migraph_db_backends::{DatabaseBackend, Row, Value};
use tokio::sync::Mutex;

use crate::error::MigrationError;
use crate::migration::MigrationKey;

/// Describes the ledger table.
#[derive(Debug)]
pub struct LedgerSchema {
    /// The table name.
    pub table: String,
    /// Column holding the app label.
    pub app_column: String,
    /// Column holding the migration name.
    pub name_column: String,
    /// Column holding the application timestamp.
    pub applied_column: String,
    /// Serializes the check-then-create of the table.
    storage_lock: Mutex<()>,
}

impl LedgerSchema {
    /// Creates a schema for the given table name with the standard columns.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            app_column: "app".to_string(),
            name_column: "name".to_string(),
            applied_column: "applied".to_string(),
            storage_lock: Mutex::new(()),
        }
    }

    /// Returns the DDL creating the table for the given vendor.
    pub fn create_sql(&self, vendor: &str) -> String {
        let id = if vendor == "sqlite" {
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        } else {
            "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                \"id\" {id}, \
                {} VARCHAR(255) NOT NULL, \
                {} VARCHAR(255) NOT NULL, \
                {} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\
            )",
            quote(&self.table),
            quote(&self.app_column),
            quote(&self.name_column),
            quote(&self.applied_column)
        )
    }
}

/// Quotes an identifier, doubling embedded quotes.
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Default for LedgerSchema {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATIONS_TABLE)
    }
}

/// A row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// The app label.
    pub app: String,
    /// The migration name.
    pub name: String,
    /// When the migration was applied (UTC).
    pub applied: NaiveDateTime,
}

impl MigrationRecord {
    /// Creates a record stamped with the current time.
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            applied: Utc::now().naive_utc(),
        }
    }

    /// Returns the key of the recorded migration.
    pub fn key(&self) -> MigrationKey {
        MigrationKey::new(self.app.clone(), self.name.clone())
    }
}

/// Reads and writes the ledger over a database connection.
pub struct MigrationRecorder<'a> {
    connection: &'a dyn DatabaseBackend,
    schema: &'a LedgerSchema,
}

impl<'a> MigrationRecorder<'a> {
    /// Creates a recorder.
    pub fn new(connection: &'a dyn DatabaseBackend, schema: &'a LedgerSchema) -> Self {
        Self { connection, schema }
    }

    /// Returns the connection alias.
    pub fn alias(&self) -> &str {
        self.connection.alias()
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &'a dyn DatabaseBackend {
        self.connection
    }

    /// Returns `true` if the ledger table exists.
    pub async fn has_storage(&self) -> Result<bool, MigrationError> {
        let tables = self.connection.table_names().await?;
        Ok(tables.iter().any(|t| *t == self.schema.table))
    }

    /// Creates the ledger table if it does not exist.
    pub async fn ensure_storage(&self) -> Result<(), MigrationError> {
        let _guard = self.schema.storage_lock.lock().await;
        if self.has_storage().await? {
            return Ok(());
        }
        let sql = self.schema.create_sql(self.connection.vendor());
        self.connection
            .execute(&sql, &[])
            .await
            .map_err(|e| MigrationError::SchemaMissing {
                table: self.schema.table.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(table = %self.schema.table, alias = self.alias(), "created ledger table");
        Ok(())
    }

    fn record_from_row(&self, row: &Row) -> Result<MigrationRecord, MigrationError> {
        Ok(MigrationRecord {
            app: row.get(&self.schema.app_column)?,
            name: row.get(&self.schema.name_column)?,
            applied: row.get(&self.schema.applied_column)?,
        })
    }

    /// Returns every applied migration.
    ///
    /// A missing table means nothing has been applied yet.
    pub async fn applied_migrations(
        &self,
    ) -> Result<BTreeMap<MigrationKey, MigrationRecord>, MigrationError> {
        if !self.has_storage().await? {
            return Ok(BTreeMap::new());
        }
        let s = self.schema;
        let sql = format!(
            "SELECT {}, {}, {} FROM {}",
            quote(&s.app_column),
            quote(&s.name_column),
            quote(&s.applied_column),
            quote(&s.table)
        );
        let rows = self.connection.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| self.record_from_row(row).map(|r| (r.key(), r)))
            .collect()
    }

    async fn is_recorded(&self, app: &str, name: &str) -> Result<bool, MigrationError> {
        let s = self.schema;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? AND {} = ?",
            quote(&s.table),
            quote(&s.app_column),
            quote(&s.name_column)
        );
        let rows = self
            .connection
            .query(&sql, &[Value::from(app), Value::from(name)])
            .await?;
        Ok(!rows.is_empty())
    }

    /// Records a migration as applied. Recording it twice is a no-op.
    pub async fn record_applied(&self, app: &str, name: &str) -> Result<(), MigrationError> {
        self.ensure_storage().await?;
        if self.is_recorded(app, name).await? {
            return Ok(());
        }
        let s = self.schema;
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}) VALUES (?, ?, ?)",
            quote(&s.table),
            quote(&s.app_column),
            quote(&s.name_column),
            quote(&s.applied_column)
        );
        self.connection
            .execute(
                &sql,
                &[
                    Value::from(app),
                    Value::from(name),
                    Value::DateTime(Utc::now().naive_utc()),
                ],
            )
            .await?;
        tracing::debug!(app, name, "recorded migration as applied");
        Ok(())
    }

    /// Removes a migration from the ledger. Removing an absent row is a no-op.
    pub async fn record_unapplied(&self, app: &str, name: &str) -> Result<(), MigrationError> {
        self.ensure_storage().await?;
        let s = self.schema;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            quote(&s.table),
            quote(&s.app_column),
            quote(&s.name_column)
        );
        self.connection
            .execute(&sql, &[Value::from(app), Value::from(name)])
            .await?;
        tracing::debug!(app, name, "recorded migration as unapplied");
        Ok(())
    }

    /// Deletes every ledger row.
    pub async fn flush(&self) -> Result<(), MigrationError> {
        if !self.has_storage().await? {
            return Ok(());
        }
        let sql = format!("DELETE FROM {}", quote(&self.schema.table));
        self.connection.execute(&sql, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migraph_db_backends::SqliteBackend;

    #[test]
    fn test_ledger_schema_sql() {
        let schema = LedgerSchema::default();
        assert_eq!(schema.table, "migraph_migrations");
        let sql = schema.create_sql("sqlite");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"migraph_migrations\""));
        assert!(sql.contains("AUTOINCREMENT"));
        assert!(LedgerSchema::new("ledger")
            .create_sql("postgresql")
            .contains("IDENTITY"));
    }

    #[tokio::test]
    async fn test_storage_is_created_lazily() {
        let db = SqliteBackend::memory().unwrap();
        let schema = LedgerSchema::default();
        let recorder = MigrationRecorder::new(&db, &schema);

        assert!(!recorder.has_storage().await.unwrap());
        assert!(recorder.applied_migrations().await.unwrap().is_empty());
        assert!(!recorder.has_storage().await.unwrap());

        recorder.ensure_storage().await.unwrap();
        recorder.ensure_storage().await.unwrap();
        assert!(recorder.has_storage().await.unwrap());
    }

    #[tokio::test]
    async fn test_record_round_trip() {
        let db = SqliteBackend::memory().unwrap();
        let schema = LedgerSchema::default();
        let recorder = MigrationRecorder::new(&db, &schema);

        recorder.record_applied("X", "0001").await.unwrap();
        recorder.record_applied("X", "0001").await.unwrap();
        recorder.record_applied("X", "0002").await.unwrap();

        let applied = recorder.applied_migrations().await.unwrap();
        assert_eq!(applied.len(), 2);
        let record = &applied[&MigrationKey::new("X", "0001")];
        assert_eq!(record.app, "X");
        assert!(record.applied <= Utc::now().naive_utc());

        recorder.record_unapplied("X", "0001").await.unwrap();
        recorder.record_unapplied("X", "0001").await.unwrap();
        let applied = recorder.applied_migrations().await.unwrap();
        assert!(!applied.contains_key(&MigrationKey::new("X", "0001")));
        assert!(applied.contains_key(&MigrationKey::new("X", "0002")));

        recorder.flush().await.unwrap();
        assert!(recorder.applied_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_table_and_alias() {
        let db = SqliteBackend::memory().unwrap().with_alias("replica");
        let schema = LedgerSchema::new("ledger");
        let recorder = MigrationRecorder::new(&db, &schema);
        recorder.record_applied("blog", "0001_initial").await.unwrap();
        assert_eq!(recorder.alias(), "replica");
        assert_eq!(db.table_names().await.unwrap(), vec!["ledger"]);
    }

    #[tokio::test]
    async fn test_quoted_table_name() {
        let db = SqliteBackend::memory().unwrap();
        let schema = LedgerSchema::new("odd\"ledger");
        assert!(schema
            .create_sql("sqlite")
            .starts_with("CREATE TABLE IF NOT EXISTS \"odd\"\"ledger\" ("));

        let recorder = MigrationRecorder::new(&db, &schema);
        recorder.record_applied("X", "0001").await.unwrap();
        assert_eq!(db.table_names().await.unwrap(), vec!["odd\"ledger"]);
        assert_eq!(recorder.applied_migrations().await.unwrap().len(), 1);
        recorder.record_unapplied("X", "0001").await.unwrap();
        assert!(recorder.applied_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_creation_failure() {
        let db = SqliteBackend::memory().unwrap();
        // An index already owns the ledger's name.
        db.execute("CREATE TABLE \"other\" (\"x\" INTEGER)", &[])
            .await
            .unwrap();
        db.execute("CREATE INDEX \"ledger\" ON \"other\" (\"x\")", &[])
            .await
            .unwrap();
        let schema = LedgerSchema::new("ledger");
        let recorder = MigrationRecorder::new(&db, &schema);
        let err = recorder.record_applied("X", "0001").await.unwrap_err();
        assert!(matches!(err, MigrationError::SchemaMissing { .. }));
    }
}
