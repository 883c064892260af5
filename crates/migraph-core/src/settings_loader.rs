//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `MIGRAPH_DEBUG` | `debug` |
//! | `MIGRAPH_LOG_LEVEL` | `log_level` |
//! | `MIGRAPH_INSTALLED_APPS` | `installed_apps` (comma-separated) |
//! | `MIGRAPH_MIGRATIONS_ROOT` | `migrations_root` |
//! | `MIGRAPH_MIGRATIONS_TABLE` | `migrations_table` |
//! | `MIGRAPH_DATABASE_NAME` | `databases.default.name` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use migraph_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("migraph.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::MigraphError;
use crate::settings::{DatabaseSettings, Settings};

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, MigraphError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| MigraphError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, MigraphError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, MigraphError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// JSON is the only format that can express a disabled migrations module
/// (`"migration_modules": {"legacy": null}`).
pub fn from_json_str(json_str: &str) -> Result<Settings, MigraphError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| MigraphError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, MigraphError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a file, picking the format from its extension, and
/// applies environment variable overrides.
pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Settings, MigraphError> {
    let path = path.as_ref();
    let mut settings = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json_file(path)?,
        _ => from_toml_file(path)?,
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `MIGRAPH_*` environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Applies overrides using an arbitrary variable lookup.
///
/// [`apply_env_overrides`] calls this with the process environment.
pub fn apply_overrides_from<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("MIGRAPH_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = lookup("MIGRAPH_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("MIGRAPH_INSTALLED_APPS") {
        settings.installed_apps = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(val) = lookup("MIGRAPH_MIGRATIONS_ROOT") {
        settings.migrations_root = PathBuf::from(val);
    }

    if let Some(val) = lookup("MIGRAPH_MIGRATIONS_TABLE") {
        settings.migrations_table = val;
    }

    if let Some(val) = lookup("MIGRAPH_DATABASE_NAME") {
        settings
            .databases
            .entry("default".to_string())
            .or_insert_with(DatabaseSettings::default)
            .name = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, MigraphError> {
    std::fs::read_to_string(path).map_err(|e| {
        MigraphError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, MigraphError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        MigraphError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        MigraphError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
