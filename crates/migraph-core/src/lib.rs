//! # migraph-core
//!
//! Core types, settings, app registry, and error types for migraph.
//! This crate has no dependency on the other migraph crates and provides the
//! foundation for all of them.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Project settings
//! - [`settings_loader`] - Loading settings from TOML, JSON and the environment
//! - [`apps`] - Application registry
//! - [`logging`] - Tracing-based logging integration

pub mod apps;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use apps::{AppConfig, AppRegistry, SimpleAppConfig};
pub use error::{MigraphError, MigraphResult};
pub use settings::{DatabaseSettings, Settings};
