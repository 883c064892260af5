//! # migraph-migrations
//!
//! Migration engine for migraph. Discovers per-app migrations, resolves
//! their cross-app dependencies into a graph, reconciles squashed
//! migrations against the applied-migrations ledger, and plans and runs
//! forward and backward migrations.
//!
//! ## Architecture
//!
//! - [`Migration`] is a named set of [`Operation`]s belonging to an app.
//! - [`MigrationSource`] discovers migrations; [`StaticSource`] and
//!   [`FileSystemSource`] are provided.
//! - [`MigrationLoader`] builds and validates the [`MigrationGraph`].
//! - [`MigrationRecorder`] reads and writes the ledger table.
//! - [`MigrationExecutor`] turns targets into a [`MigrationPlan`] and runs it.
//!
//! ## Module Overview
//!
//! - [`migration`] - `Migration`, `MigrationKey`
//! - [`graph`] - `MigrationGraph`, plans, cycle detection
//! - [`source`] - discovery sources and the JSON migration file format
//! - [`loader`] - `MigrationLoader`, `LoaderSession`
//! - [`recorder`] - `MigrationRecorder`, `LedgerSchema`
//! - [`executor`] - `MigrationExecutor`, `MigrationPlan`, `MigrationTarget`
//! - [`operations`] - `Operation` trait and the concrete operations
//! - [`schema_editor`] - `SchemaEditor` trait and the ANSI implementation
//! - [`state`] - `ProjectState`, `ModelState`
//! - [`error`] - `MigrationError`

#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::future_not_send)]

pub mod error;
pub mod executor;
pub mod graph;
pub mod loader;
pub mod migration;
pub mod operations;
pub mod recorder;
pub mod schema_editor;
pub mod source;
pub mod state;

// Re-export key types at the crate root.
pub use error::MigrationError;
pub use executor::{MigrationExecutor, MigrationPlan, MigrationStep, MigrationTarget};
pub use graph::{EdgeKind, MigrationGraph};
pub use loader::{AppliedState, LoaderOptions, LoaderSession, MigrationLoader};
pub use migration::{Migration, MigrationKey, FIRST, LATEST};
pub use operations::Operation;
pub use recorder::{LedgerSchema, MigrationRecord, MigrationRecorder};
pub use schema_editor::{AnsiSchemaEditor, SchemaEditor};
pub use source::{FileSystemSource, MigrationSource, ModuleEntry, ModuleLookup, StaticSource};
pub use state::{FieldDef, ModelState, ProjectState};
