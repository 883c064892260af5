//! Core error types for migraph.
//!
//! [`MigraphError`] covers the failures that can happen below the migration
//! engine: storage access, configuration, and I/O. The migration engine wraps
//! it in its own error type for graph and ledger failures.

use thiserror::Error;

/// The primary error type shared by the migraph crates.
#[derive(Error, Debug)]
pub enum MigraphError {
    // ── Database errors ──────────────────────────────────────────────

    /// Raised when a query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// Raised when a query expected exactly one result but found multiple.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The project is improperly configured.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MigraphError {
    /// Returns `true` for errors raised by the storage layer.
    pub const fn is_database_error(&self) -> bool {
        matches!(
            self,
            Self::DoesNotExist(_)
                | Self::MultipleObjectsReturned(_)
                | Self::DatabaseError(_)
                | Self::OperationalError(_)
        )
    }
}

/// A convenience type alias for `Result<T, MigraphError>`.
pub type MigraphResult<T> = Result<T, MigraphError>;
