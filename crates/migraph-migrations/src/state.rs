//! In-memory project state.
//!
//! [`ProjectState`] is the schema a sequence of migrations produces when
//! replayed in order. The graph builds it with `make_state`, and operations
//! read it to generate DDL.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A column definition carried by a migration.
///
/// The column type is passed verbatim to the schema editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// The field (and column) name.
    pub name: String,
    /// The SQL column type, e.g. `INTEGER` or `VARCHAR(100)`.
    pub column_type: String,
    /// Whether the column accepts NULL.
    #[serde(default)]
    pub null: bool,
    /// Whether this column is the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldDef {
    /// Creates a non-null, non-key field.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            null: false,
            primary_key: false,
        }
    }

    /// Marks the field as nullable.
    #[must_use]
    pub fn null(mut self) -> Self {
        self.null = true;
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// The state of a single model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelState {
    /// The app the model belongs to.
    pub app_label: String,
    /// The model name (lowercase).
    pub name: String,
    /// The fields, in declaration order.
    pub fields: Vec<FieldDef>,
}

impl ModelState {
    /// Creates a model state; the name is lowercased.
    pub fn new(app_label: impl Into<String>, name: &str, fields: Vec<FieldDef>) -> Self {
        Self {
            app_label: app_label.into(),
            name: name.to_lowercase(),
            fields,
        }
    }

    /// Returns the table name, `{app_label}_{name}`.
    pub fn db_table(&self) -> String {
        format!("{}_{}", self.app_label, self.name)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The schema of all models at a point in migration history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectState {
    /// Models keyed by `(app_label, lowercase model name)`.
    pub models: BTreeMap<(String, String), ModelState>,
    /// Apps without migrations; always considered present.
    pub real_apps: BTreeSet<String>,
}

impl ProjectState {
    /// Creates an empty project state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty state that includes the given unmigrated apps.
    pub fn with_real_apps<I, S>(real_apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: BTreeMap::new(),
            real_apps: real_apps.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds or replaces a model.
    pub fn add_model(&mut self, model: ModelState) {
        let key = (model.app_label.clone(), model.name.clone());
        self.models.insert(key, model);
    }

    /// Removes a model, returning it if present.
    pub fn remove_model(&mut self, app_label: &str, name: &str) -> Option<ModelState> {
        self.models
            .remove(&(app_label.to_string(), name.to_lowercase()))
    }

    /// Looks up a model.
    pub fn model(&self, app_label: &str, name: &str) -> Option<&ModelState> {
        self.models.get(&(app_label.to_string(), name.to_lowercase()))
    }

    /// Looks up a model mutably.
    pub fn model_mut(&mut self, app_label: &str, name: &str) -> Option<&mut ModelState> {
        self.models
            .get_mut(&(app_label.to_string(), name.to_lowercase()))
    }
}
