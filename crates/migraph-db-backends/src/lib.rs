//! # migraph-db-backends
//!
//! Storage backends for migraph. The migration engine only talks to the
//! [`DatabaseBackend`] trait: statement execution, row queries, transactions,
//! and table introspection.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`)

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]

pub mod base;
pub mod row;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod value;

pub use base::{connect, DatabaseBackend, DatabaseConfig};
pub use row::{FromValue, Row};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use value::Value;
