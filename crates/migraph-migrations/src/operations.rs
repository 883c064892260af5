//! Migration operations that describe schema changes.
//!
//! Each operation knows how to apply itself to the in-memory
//! [`ProjectState`] and how to produce DDL, forwards and backwards, through a
//! [`SchemaEditor`].

use std::fmt::Debug;

use migraph_core::MigraphError;
use serde::{Deserialize, Serialize};

use crate::error::MigrationError;
use crate::schema_editor::SchemaEditor;
use crate::state::{FieldDef, ModelState, ProjectState};

/// A single migration operation that can be applied forwards or backwards.
pub trait Operation: Send + Sync + Debug {
    /// Returns a human-readable description of this operation.
    fn describe(&self) -> String;

    /// Applies this operation to the in-memory project state.
    fn state_forwards(&self, app_label: &str, state: &mut ProjectState);

    /// Generates the DDL SQL to apply this operation.
    fn database_forwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError>;

    /// Generates the DDL SQL to reverse this operation.
    ///
    /// `from_state` is the state after the operation, `to_state` the state
    /// before it.
    fn database_backwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError>;

    /// Returns whether this operation is reversible.
    fn reversible(&self) -> bool {
        true
    }
}

fn missing_model(app_label: &str, name: &str, which: &str) -> MigrationError {
    MigraphError::DoesNotExist(format!("Model {app_label}.{name} not found in {which}")).into()
}

/// Creates a new table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateModel {
    /// The model name.
    pub name: String,
    /// The fields of the new table.
    pub fields: Vec<FieldDef>,
}

impl CreateModel {
    /// Creates the operation.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

impl Operation for CreateModel {
    fn describe(&self) -> String {
        format!("Create model {}", self.name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        state.add_model(ModelState::new(app_label, &self.name, self.fields.clone()));
    }

    fn database_forwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        _from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = to_state
            .model(app_label, &self.name)
            .ok_or_else(|| missing_model(app_label, &self.name, "state"))?;
        Ok(schema_editor.create_table(model))
    }

    fn database_backwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        from_state: &ProjectState,
        _to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = from_state
            .model(app_label, &self.name)
            .ok_or_else(|| missing_model(app_label, &self.name, "state"))?;
        Ok(schema_editor.drop_table(&model.db_table()))
    }
}

/// Drops a table.
///
/// Reversal recreates the table from the state before the deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteModel {
    /// The model name to delete.
    pub name: String,
}

impl DeleteModel {
    /// Creates the operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Operation for DeleteModel {
    fn describe(&self) -> String {
        format!("Delete model {}", self.name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        state.remove_model(app_label, &self.name);
    }

    fn database_forwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        from_state: &ProjectState,
        _to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = from_state
            .model(app_label, &self.name)
            .ok_or_else(|| missing_model(app_label, &self.name, "state"))?;
        Ok(schema_editor.drop_table(&model.db_table()))
    }

    fn database_backwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        _from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = to_state
            .model(app_label, &self.name)
            .ok_or_else(|| missing_model(app_label, &self.name, "previous state"))?;
        Ok(schema_editor.create_table(model))
    }
}

/// Adds a column to an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddField {
    /// The model the field is added to.
    pub model_name: String,
    /// The field to add.
    pub field: FieldDef,
}

impl AddField {
    /// Creates the operation.
    pub fn new(model_name: impl Into<String>, field: FieldDef) -> Self {
        Self {
            model_name: model_name.into(),
            field,
        }
    }
}

impl Operation for AddField {
    fn describe(&self) -> String {
        format!("Add field {} to {}", self.field.name, self.model_name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.model_mut(app_label, &self.model_name) {
            model.fields.push(self.field.clone());
        }
    }

    fn database_forwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        _from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = to_state
            .model(app_label, &self.model_name)
            .ok_or_else(|| missing_model(app_label, &self.model_name, "state"))?;
        Ok(schema_editor.add_column(&model.db_table(), &self.field))
    }

    fn database_backwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        from_state: &ProjectState,
        _to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = from_state
            .model(app_label, &self.model_name)
            .ok_or_else(|| missing_model(app_label, &self.model_name, "state"))?;
        Ok(schema_editor.drop_column(&model.db_table(), &self.field.name))
    }
}

/// Removes a column from an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveField {
    /// The model the field is removed from.
    pub model_name: String,
    /// The name of the field to remove.
    pub field_name: String,
}

impl RemoveField {
    /// Creates the operation.
    pub fn new(model_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl Operation for RemoveField {
    fn describe(&self) -> String {
        format!("Remove field {} from {}", self.field_name, self.model_name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.model_mut(app_label, &self.model_name) {
            model.fields.retain(|f| f.name != self.field_name);
        }
    }

    fn database_forwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        from_state: &ProjectState,
        _to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = from_state
            .model(app_label, &self.model_name)
            .ok_or_else(|| missing_model(app_label, &self.model_name, "state"))?;
        Ok(schema_editor.drop_column(&model.db_table(), &self.field_name))
    }

    fn database_backwards(
        &self,
        app_label: &str,
        schema_editor: &dyn SchemaEditor,
        _from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        let model = to_state
            .model(app_label, &self.model_name)
            .ok_or_else(|| missing_model(app_label, &self.model_name, "previous state"))?;
        let field = model.field(&self.field_name).ok_or_else(|| {
            MigrationError::from(MigraphError::DoesNotExist(format!(
                "Field {} not found on {app_label}.{}",
                self.field_name, self.model_name
            )))
        })?;
        Ok(schema_editor.add_column(&model.db_table(), field))
    }
}

/// Runs raw SQL.
///
/// Without `reverse_sql` the operation is irreversible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSql {
    /// SQL run when applying.
    pub sql: String,
    /// SQL run when unapplying.
    #[serde(default)]
    pub reverse_sql: Option<String>,
}

impl RunSql {
    /// Creates an irreversible raw SQL operation.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            reverse_sql: None,
        }
    }

    /// Sets the SQL used to reverse this operation.
    #[must_use]
    pub fn reverse_sql(mut self, sql: impl Into<String>) -> Self {
        self.reverse_sql = Some(sql.into());
        self
    }
}

impl Operation for RunSql {
    fn describe(&self) -> String {
        "Raw SQL operation".to_string()
    }

    fn state_forwards(&self, _app_label: &str, _state: &mut ProjectState) {}

    fn database_forwards(
        &self,
        _app_label: &str,
        _schema_editor: &dyn SchemaEditor,
        _from_state: &ProjectState,
        _to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        Ok(vec![self.sql.clone()])
    }

    fn database_backwards(
        &self,
        _app_label: &str,
        _schema_editor: &dyn SchemaEditor,
        _from_state: &ProjectState,
        _to_state: &ProjectState,
    ) -> Result<Vec<String>, MigrationError> {
        self.reverse_sql.clone().map(|sql| vec![sql]).ok_or_else(|| {
            MigraphError::OperationalError("RunSql operation has no reverse_sql".into()).into()
        })
    }

    fn reversible(&self) -> bool {
        self.reverse_sql.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_editor::AnsiSchemaEditor;

    fn post_state() -> ProjectState {
        let mut state = ProjectState::new();
        CreateModel::new(
            "Post",
            vec![
                FieldDef::new("id", "INTEGER").primary_key(),
                FieldDef::new("title", "TEXT"),
            ],
        )
        .state_forwards("blog", &mut state);
        state
    }

    #[test]
    fn test_create_model() {
        let op = CreateModel::new("Post", vec![FieldDef::new("id", "INTEGER").primary_key()]);
        let before = ProjectState::new();
        let mut after = before.clone();
        op.state_forwards("blog", &mut after);
        assert!(after.model("blog", "Post").is_some());

        let fwd = op
            .database_forwards("blog", &AnsiSchemaEditor, &before, &after)
            .unwrap();
        assert!(fwd[0].starts_with("CREATE TABLE \"blog_post\""));

        let bwd = op
            .database_backwards("blog", &AnsiSchemaEditor, &after, &before)
            .unwrap();
        assert_eq!(bwd, vec!["DROP TABLE \"blog_post\""]);
        assert_eq!(op.describe(), "Create model Post");
    }

    #[test]
    fn test_delete_model_backwards_recreates() {
        let op = DeleteModel::new("Post");
        let before = post_state();
        let mut after = before.clone();
        op.state_forwards("blog", &mut after);
        assert!(after.models.is_empty());

        let bwd = op
            .database_backwards("blog", &AnsiSchemaEditor, &after, &before)
            .unwrap();
        assert!(bwd[0].contains("\"title\" TEXT NOT NULL"));
    }

    #[test]
    fn test_delete_unknown_model_errors() {
        let op = DeleteModel::new("Ghost");
        let state = ProjectState::new();
        let err = op
            .database_forwards("blog", &AnsiSchemaEditor, &state, &state)
            .unwrap_err();
        assert!(err.to_string().contains("blog.Ghost"));
    }

    #[test]
    fn test_remove_field_backwards_restores_column() {
        let op = RemoveField::new("Post", "title");
        let before = post_state();
        let mut after = before.clone();
        op.state_forwards("blog", &mut after);
        assert!(after.model("blog", "post").unwrap().field("title").is_none());

        let fwd = op
            .database_forwards("blog", &AnsiSchemaEditor, &before, &after)
            .unwrap();
        assert_eq!(fwd, vec!["ALTER TABLE \"blog_post\" DROP COLUMN \"title\""]);
        let bwd = op
            .database_backwards("blog", &AnsiSchemaEditor, &after, &before)
            .unwrap();
        assert_eq!(
            bwd,
            vec!["ALTER TABLE \"blog_post\" ADD COLUMN \"title\" TEXT NOT NULL"]
        );
    }

    #[test]
    fn test_run_sql_reversibility() {
        let once = RunSql::new("INSERT INTO t VALUES (1)");
        assert!(!once.reversible());
        let state = ProjectState::new();
        assert!(once
            .database_backwards("blog", &AnsiSchemaEditor, &state, &state)
            .is_err());

        let both = RunSql::new("INSERT INTO t VALUES (1)").reverse_sql("DELETE FROM t");
        assert!(both.reversible());
        assert_eq!(
            both.database_backwards("blog", &AnsiSchemaEditor, &state, &state)
                .unwrap(),
            vec!["DELETE FROM t"]
        );
    }
}
