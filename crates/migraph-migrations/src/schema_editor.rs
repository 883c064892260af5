//! Schema editor capability.
//!
//! The [`SchemaEditor`] trait turns schema operations into DDL statements.
//! Operations never build SQL themselves; they ask the editor. Returning
//! `Vec<String>` leaves room for engines that need several statements for a
//! single change.

use crate::state::{FieldDef, ModelState};

/// Generates DDL SQL for schema operations.
pub trait SchemaEditor: Send + Sync {
    /// Quotes an identifier.
    fn quote_name(&self, name: &str) -> String;

    /// Generates `CREATE TABLE` DDL for a model.
    fn create_table(&self, model: &ModelState) -> Vec<String>;

    /// Generates `DROP TABLE` DDL.
    fn drop_table(&self, table_name: &str) -> Vec<String>;

    /// Generates `ALTER TABLE ... ADD COLUMN` DDL.
    fn add_column(&self, table_name: &str, field: &FieldDef) -> Vec<String>;

    /// Generates `ALTER TABLE ... DROP COLUMN` DDL.
    fn drop_column(&self, table_name: &str, column_name: &str) -> Vec<String>;
}

/// Portable editor emitting ANSI-quoted DDL.
///
/// Column types are taken verbatim from the field definition, so the output
/// runs on any engine that understands the types the migration names.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiSchemaEditor;

impl AnsiSchemaEditor {
    fn column_sql(field: &FieldDef) -> String {
        let constraint = if field.primary_key {
            " PRIMARY KEY"
        } else if field.null {
            " NULL"
        } else {
            " NOT NULL"
        };
        format!("{}{constraint}", field.column_type)
    }
}

impl SchemaEditor for AnsiSchemaEditor {
    fn quote_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn create_table(&self, model: &ModelState) -> Vec<String> {
        let columns: Vec<String> = model
            .fields
            .iter()
            .map(|f| format!("{} {}", self.quote_name(&f.name), Self::column_sql(f)))
            .collect();
        vec![format!(
            "CREATE TABLE {} ({})",
            self.quote_name(&model.db_table()),
            columns.join(", ")
        )]
    }

    fn drop_table(&self, table_name: &str) -> Vec<String> {
        vec![format!("DROP TABLE {}", self.quote_name(table_name))]
    }

    fn add_column(&self, table_name: &str, field: &FieldDef) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote_name(table_name),
            self.quote_name(&field.name),
            Self::column_sql(field)
        )]
    }

    fn drop_column(&self, table_name: &str, column_name: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_name(table_name),
            self.quote_name(column_name)
        )]
    }
}
