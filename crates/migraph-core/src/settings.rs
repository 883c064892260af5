//! Project settings.
//!
//! [`Settings`] is a plain struct built once at startup (usually through
//! [`settings_loader`](crate::settings_loader)) and passed by reference to the
//! components that need it. There is no global settings instance.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the ledger table used when none is configured.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migraph_migrations";

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (e.g. `sqlite`).
    pub engine: String,
    /// The database name (or file path for `SQLite`).
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: "db.sqlite3".to_string(),
        }
    }
}

/// The complete set of project settings.
///
/// # Examples
///
/// ```
/// use migraph_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.migrations_table, "migraph_migrations");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log filter (e.g. "info", "migraph_migrations=debug").
    pub log_level: String,
    /// Installed application dotted paths, in registration order.
    pub installed_apps: Vec<String>,
    /// Database configurations, keyed by alias (e.g. "default").
    pub databases: HashMap<String, DatabaseSettings>,
    /// Per-app override of the migrations module path.
    ///
    /// A `null` value disables migrations for that app.
    pub migration_modules: BTreeMap<String, Option<String>>,
    /// Directory under which file-based migration modules are resolved.
    pub migrations_root: PathBuf,
    /// Name of the table holding the applied-migrations ledger.
    pub migrations_table: String,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());
        Self {
            debug: true,
            log_level: "info".to_string(),
            installed_apps: Vec::new(),
            databases,
            migration_modules: BTreeMap::new(),
            migrations_root: PathBuf::from("."),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }
}

impl Settings {
    /// Returns the database settings for the given alias, if configured.
    pub fn database(&self, alias: &str) -> Option<&DatabaseSettings> {
        self.databases.get(alias)
    }
}
