//! # migraph
//!
//! Migration dependency resolution, applied-state ledger and plan execution.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `migraph` to get everything, or depend on individual
//! crates for finer-grained control.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use migraph::core::AppRegistry;
//! use migraph::migrations::{Migration, MigrationKey, MigrationLoader, StaticSource};
//!
//! let source = StaticSource::new()
//!     .with_migration("blog.migrations", Migration::new("blog", "0001_initial"))
//!     .with_migration(
//!         "blog.migrations",
//!         Migration::new("blog", "0002_tags").depends_on("blog", "0001_initial"),
//!     );
//! let apps = AppRegistry::from_installed_apps(&["blog"]).unwrap();
//! let mut loader = MigrationLoader::new(Arc::new(apps), Arc::new(source));
//! loader.build_graph_with_applied([]).unwrap();
//!
//! assert_eq!(
//!     loader.graph().leaf_nodes(Some("blog")),
//!     vec![MigrationKey::new("blog", "0002_tags")]
//! );
//! ```

/// Core types, settings, app registry, and error types.
pub use migraph_core as core;

/// Storage backends and the `DatabaseBackend` trait.
pub use migraph_db_backends as db_backends;

/// Migration graph, loader, recorder and executor.
pub use migraph_migrations as migrations;

/// Management commands (CLI).
#[cfg(feature = "cli")]
pub use migraph_cli as cli;

pub use tokio;
pub use tracing;

pub use migraph_migrations::{
    Migration, MigrationError, MigrationExecutor, MigrationGraph, MigrationKey, MigrationLoader,
    MigrationRecorder,
};
