//! Migration keys and migration units.
//!
//! A [`Migration`] is a named unit of schema change owned by an app. It
//! declares the migrations it depends on, the migrations it must run before,
//! and, for squashed migrations, the older migrations it replaces. Units are
//! immutable once loaded and shared as `Arc<Migration>`.

use std::fmt;
use std::sync::Arc;

use crate::error::MigrationError;
use crate::operations::Operation;
use crate::schema_editor::SchemaEditor;
use crate::state::ProjectState;

/// Dependency name resolved to the first (root) migration of an app.
pub const FIRST: &str = "__first__";

/// Dependency name resolved to the latest (leaf) migration of an app.
pub const LATEST: &str = "__latest__";

/// Identity of a migration: `(app_label, name)`.
///
/// Ordering is by app label, then by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigrationKey {
    /// The app the migration belongs to.
    pub app_label: String,
    /// The migration name, conventionally numerically prefixed.
    pub name: String,
}

impl MigrationKey {
    /// Creates a key.
    pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            name: name.into(),
        }
    }

    /// Returns `true` if the name is `__first__` or `__latest__`.
    pub fn is_sentinel(&self) -> bool {
        self.name == FIRST || self.name == LATEST
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.name)
    }
}

impl From<(&str, &str)> for MigrationKey {
    fn from((app_label, name): (&str, &str)) -> Self {
        Self::new(app_label, name)
    }
}

impl From<(String, String)> for MigrationKey {
    fn from((app_label, name): (String, String)) -> Self {
        Self { app_label, name }
    }
}

/// A single migration unit.
///
/// # Examples
///
/// ```
/// use migraph_migrations::Migration;
///
/// let squash = Migration::new("blog", "0001_squashed_0003")
///     .depends_on("auth", "__first__")
///     .replaces("blog", "0001_initial")
///     .replaces("blog", "0002_tags")
///     .replaces("blog", "0003_slugs");
/// assert!(squash.is_squash());
/// assert_eq!(squash.key().to_string(), "blog.0001_squashed_0003");
/// ```
#[derive(Debug, Clone)]
pub struct Migration {
    /// The app this migration belongs to.
    pub app_label: String,
    /// The migration name.
    pub name: String,
    /// Migrations that must be applied before this one.
    pub dependencies: Vec<MigrationKey>,
    /// Migrations that must be applied after this one.
    pub run_before: Vec<MigrationKey>,
    /// Migrations this (squashed) migration replaces, in order.
    pub replaces: Vec<MigrationKey>,
    /// Whether this is the initial migration for the app. Informational
    /// only: planning and execution do not read it.
    pub initial: bool,
    /// Whether the migration runs inside a single transaction.
    pub atomic: bool,
    /// The operations, applied in order.
    pub operations: Vec<Arc<dyn Operation>>,
}

impl Migration {
    /// Creates an empty, atomic migration.
    pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            name: name.into(),
            dependencies: Vec::new(),
            run_before: Vec::new(),
            replaces: Vec::new(),
            initial: false,
            atomic: true,
            operations: Vec::new(),
        }
    }

    /// Marks this migration as the initial migration.
    #[must_use]
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Runs this migration outside a transaction.
    #[must_use]
    pub fn non_atomic(mut self) -> Self {
        self.atomic = false;
        self
    }

    /// Adds a dependency on another migration.
    #[must_use]
    pub fn depends_on(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push(MigrationKey::new(app_label, name));
        self
    }

    /// Declares that another migration must run after this one.
    #[must_use]
    pub fn run_before(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
        self.run_before.push(MigrationKey::new(app_label, name));
        self
    }

    /// Declares that this migration replaces another.
    #[must_use]
    pub fn replaces(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
        self.replaces.push(MigrationKey::new(app_label, name));
        self
    }

    /// Adds an operation to this migration.
    #[must_use]
    pub fn add_operation(mut self, op: impl Operation + 'static) -> Self {
        self.operations.push(Arc::new(op));
        self
    }

    /// Re-stamps the identity, as done by the loader at discovery time.
    #[must_use]
    pub fn with_identity(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
        self.app_label = app_label.into();
        self.name = name.into();
        self
    }

    /// Returns the key for this migration.
    pub fn key(&self) -> MigrationKey {
        MigrationKey::new(self.app_label.clone(), self.name.clone())
    }

    /// Returns `true` if this migration replaces others.
    pub fn is_squash(&self) -> bool {
        !self.replaces.is_empty()
    }

    /// Applies every operation's state change to `state`.
    pub fn mutate_state(&self, state: &mut ProjectState) {
        for op in &self.operations {
            op.state_forwards(&self.app_label, state);
        }
    }

    /// Produces the SQL applying this migration, advancing `state` past it.
    pub fn apply(
        &self,
        state: &mut ProjectState,
        schema_editor: &dyn SchemaEditor,
    ) -> Result<Vec<String>, MigrationError> {
        let mut sql = Vec::new();
        for op in &self.operations {
            let from_state = state.clone();
            op.state_forwards(&self.app_label, state);
            sql.extend(op.database_forwards(&self.app_label, schema_editor, &from_state, state)?);
        }
        Ok(sql)
    }

    /// Produces the SQL reversing this migration.
    ///
    /// `state` is the project state before this migration was applied.
    /// Operations are reversed last-to-first, each seeing the state it
    /// originally produced as `from_state`.
    pub fn unapply(
        &self,
        state: &ProjectState,
        schema_editor: &dyn SchemaEditor,
    ) -> Result<Vec<String>, MigrationError> {
        let mut to_run = Vec::with_capacity(self.operations.len());
        let mut new_state = state.clone();
        for op in &self.operations {
            if !op.reversible() {
                return Err(MigrationError::Irreversible {
                    migration: self.key(),
                    operation: op.describe(),
                });
            }
            let old_state = new_state.clone();
            op.state_forwards(&self.app_label, &mut new_state);
            to_run.push((op, old_state, new_state.clone()));
        }

        let mut sql = Vec::new();
        for (op, to_state, from_state) in to_run.into_iter().rev() {
            sql.extend(op.database_backwards(
                &self.app_label,
                schema_editor,
                &from_state,
                &to_state,
            )?);
        }
        Ok(sql)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{AddField, CreateModel, RunSql};
    use crate::schema_editor::AnsiSchemaEditor;
    use crate::state::FieldDef;

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            MigrationKey::new("b", "0001"),
            MigrationKey::new("a", "0002"),
            MigrationKey::new("a", "0001"),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["a.0001", "a.0002", "b.0001"]
        );
    }

    #[test]
    fn test_key_sentinel() {
        assert!(MigrationKey::new("a", FIRST).is_sentinel());
        assert!(MigrationKey::new("a", LATEST).is_sentinel());
        assert!(!MigrationKey::new("a", "0001_initial").is_sentinel());
    }

    #[test]
    fn test_migration_builder() {
        let m = Migration::new("blog", "0002_author")
            .depends_on("blog", "0001_initial")
            .depends_on("auth", "0001_initial")
            .run_before("comments", "0001_initial");
        assert_eq!(m.dependencies.len(), 2);
        assert_eq!(m.run_before, vec![MigrationKey::new("comments", "0001_initial")]);
        assert!(m.atomic);
        assert!(!m.is_squash());
        assert!(!m.initial);
    }

    #[test]
    fn test_with_identity() {
        let m = Migration::new("", "").initial().with_identity("blog", "0001_initial");
        assert_eq!(m.key(), MigrationKey::new("blog", "0001_initial"));
        assert!(m.initial);
    }

    #[test]
    fn test_apply_advances_state() {
        let m = Migration::new("blog", "0001_initial")
            .add_operation(CreateModel::new(
                "Post",
                vec![FieldDef::new("id", "INTEGER").primary_key()],
            ))
            .add_operation(AddField::new("Post", FieldDef::new("title", "TEXT")));

        let mut state = ProjectState::new();
        let sql = m.apply(&mut state, &AnsiSchemaEditor).unwrap();
        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("CREATE TABLE \"blog_post\""));
        assert!(sql[1].contains("ADD COLUMN \"title\" TEXT"));
        assert_eq!(state.model("blog", "post").unwrap().fields.len(), 2);
    }

    #[test]
    fn test_unapply_reverses_in_order() {
        let m = Migration::new("blog", "0001_initial")
            .add_operation(CreateModel::new(
                "Post",
                vec![FieldDef::new("id", "INTEGER").primary_key()],
            ))
            .add_operation(AddField::new("Post", FieldDef::new("title", "TEXT")));

        let sql = m.unapply(&ProjectState::new(), &AnsiSchemaEditor).unwrap();
        assert_eq!(sql.len(), 2);
        assert!(sql[0].contains("DROP COLUMN \"title\""));
        assert!(sql[1].starts_with("DROP TABLE \"blog_post\""));
    }

    #[test]
    fn test_unapply_irreversible() {
        let m = Migration::new("blog", "0003_data").add_operation(RunSql::new("UPDATE x SET y = 1"));
        let err = m.unapply(&ProjectState::new(), &AnsiSchemaEditor).unwrap_err();
        assert!(matches!(err, MigrationError::Irreversible { .. }));
    }
}
