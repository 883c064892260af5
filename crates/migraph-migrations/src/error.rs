//! Errors raised while loading, validating, recording, and executing migrations.

use migraph_core::MigraphError;
use thiserror::Error;

use crate::migration::MigrationKey;

/// Failures of the migration engine.
///
/// All variants are local and synchronous; nothing inside the engine retries.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// A migrations module could not be discovered or a unit could not be read.
    #[error("{0}")]
    Discovery(String),

    /// A discovered unit does not carry a migration definition.
    #[error("Migration {name} in app {app_label} has no migration definition")]
    BadMigration {
        /// The app the unit was discovered in.
        app_label: String,
        /// The unit name.
        name: String,
    },

    /// A prefix lookup matched more than one migration.
    #[error("There is more than one migration for '{app_label}' with the prefix '{prefix}'")]
    Ambiguity {
        /// The app searched.
        app_label: String,
        /// The prefix used.
        prefix: String,
    },

    /// A prefix lookup matched nothing.
    #[error("There is no migration for '{app_label}' with the prefix '{prefix}'")]
    MigrationNotFound {
        /// The app searched.
        app_label: String,
        /// The prefix used.
        prefix: String,
    },

    /// An edge or lookup references a node that is not in the graph.
    #[error("{message}")]
    NodeNotFound {
        /// Human-readable description.
        message: String,
        /// The missing node.
        node: MigrationKey,
        /// The migration whose dependency referenced the missing node.
        origin: Option<MigrationKey>,
    },

    /// A node with this key was added twice.
    #[error("Duplicate migration node: {0}")]
    DuplicateNode(MigrationKey),

    /// A dependency could not be resolved to a node (unknown app, or an app
    /// with no migrations to resolve a sentinel against).
    #[error("{0}")]
    DependencyResolution(String),

    /// The graph contains a cycle; the offending nodes are listed in order.
    #[error("Circular dependency: {}", format_cycle(.0))]
    CircularDependency(Vec<MigrationKey>),

    /// An applied migration has an unapplied dependency.
    #[error(
        "Migration {migration} is applied before its dependency {dependency} on database '{alias}'."
    )]
    InconsistentHistory {
        /// The applied migration.
        migration: MigrationKey,
        /// Its unapplied dependency.
        dependency: MigrationKey,
        /// The database alias inspected.
        alias: String,
    },

    /// The ledger table could not be created.
    #[error("Unable to create the {table} table ({reason})")]
    SchemaMissing {
        /// The ledger table name.
        table: String,
        /// The underlying storage failure.
        reason: String,
    },

    /// An operation cannot be reversed.
    #[error("Operation {operation} in {migration} is not reversible")]
    Irreversible {
        /// The migration being unapplied.
        migration: MigrationKey,
        /// Description of the offending operation.
        operation: String,
    },

    /// A plan mixes forwards and backwards steps.
    #[error("{0}")]
    InvalidPlan(String),

    /// A storage or configuration failure from the layers below.
    #[error(transparent)]
    Database(#[from] MigraphError),
}

impl MigrationError {
    /// Builds a [`MigrationError::NodeNotFound`] with the standard message.
    pub fn node_not_found(node: MigrationKey, origin: Option<MigrationKey>) -> Self {
        let message = match &origin {
            Some(origin) => format!(
                "Migration {origin} dependencies reference nonexistent parent node ('{}', '{}')",
                node.app_label, node.name
            ),
            None => format!("Node ('{}', '{}') not a valid node", node.app_label, node.name),
        };
        Self::NodeNotFound {
            message,
            node,
            origin,
        }
    }
}

fn format_cycle(cycle: &[MigrationKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
