//! Application registry.
//!
//! Every independently-versioned source of migrations is an "app". The
//! [`AppRegistry`] holds them in registration order and resolves them by
//! label; the migration loader walks it to discover migrations.

use std::collections::HashMap;

use crate::error::MigraphError;

/// Configuration for an installed application.
///
/// # Examples
///
/// ```
/// use migraph_core::apps::AppConfig;
///
/// struct Billing;
///
/// impl AppConfig for Billing {
///     fn name(&self) -> &str { "shop.billing" }
/// }
///
/// assert_eq!(Billing.label(), "billing");
/// ```
pub trait AppConfig: Send + Sync {
    /// Returns the full dotted path of the application.
    fn name(&self) -> &str;

    /// Returns a short label derived from the name (the last component).
    ///
    /// For example, `"shop.contrib.auth"` yields `"auth"`.
    fn label(&self) -> &str {
        self.name().rsplit('.').next().unwrap_or_else(|| self.name())
    }
}

/// An [`AppConfig`] built from a dotted path, with an optional explicit label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleAppConfig {
    name: String,
    label: Option<String>,
}

impl SimpleAppConfig {
    /// Creates an app config whose label is the last path component.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
        }
    }

    /// Overrides the derived label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl AppConfig for SimpleAppConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        match &self.label {
            Some(label) => label.as_str(),
            None => self.name.rsplit('.').next().unwrap_or(&self.name),
        }
    }
}

/// The central registry of installed applications.
#[derive(Default)]
pub struct AppRegistry {
    apps: Vec<Box<dyn AppConfig>>,
    app_labels: HashMap<String, usize>,
}

impl AppRegistry {
    /// Creates a new, empty `AppRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from installed app dotted paths, as found in
    /// [`Settings::installed_apps`](crate::settings::Settings::installed_apps).
    pub fn from_installed_apps<S: AsRef<str>>(installed: &[S]) -> Result<Self, MigraphError> {
        let mut registry = Self::new();
        for name in installed {
            registry.register(Box::new(SimpleAppConfig::new(name.as_ref())))?;
        }
        Ok(registry)
    }

    /// Registers an application.
    ///
    /// Fails if an application with the same label is already registered.
    pub fn register(&mut self, app: Box<dyn AppConfig>) -> Result<(), MigraphError> {
        let label = app.label().to_string();
        if self.app_labels.contains_key(&label) {
            return Err(MigraphError::ImproperlyConfigured(format!(
                "Application labels aren't unique, duplicates: {label}"
            )));
        }

        self.app_labels.insert(label, self.apps.len());
        self.apps.push(app);
        Ok(())
    }

    /// Returns the configuration for the app with the given label, if registered.
    pub fn get_app_config(&self, label: &str) -> Option<&dyn AppConfig> {
        self.app_labels
            .get(label)
            .map(|&idx| self.apps[idx].as_ref())
    }

    /// Returns all registered app configurations in registration order.
    pub fn get_app_configs(&self) -> &[Box<dyn AppConfig>] {
        &self.apps
    }

    /// Returns `true` if an app with this label is registered.
    pub fn contains(&self, label: &str) -> bool {
        self.app_labels.contains_key(label)
    }

    /// Returns the number of registered apps.
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Returns `true` if no apps are registered.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = AppRegistry::new();
        registry
            .register(Box::new(SimpleAppConfig::new("myproject.myapp")))
            .unwrap();

        let app = registry.get_app_config("myapp").expect("app should exist");
        assert_eq!(app.name(), "myproject.myapp");
        assert_eq!(app.label(), "myapp");
        assert!(registry.contains("myapp"));
        assert!(!registry.contains("myproject.myapp"));
    }

    #[test]
    fn test_from_installed_apps_preserves_order() {
        let registry = AppRegistry::from_installed_apps(&["contrib.auth", "blog", "shop.orders"])
            .unwrap();
        let labels: Vec<&str> = registry.get_app_configs().iter().map(|a| a.label()).collect();
        assert_eq!(labels, vec!["auth", "blog", "orders"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let err = AppRegistry::from_installed_apps(&["contrib.auth", "legacy.auth"])
            .err()
            .unwrap();
        assert!(matches!(err, MigraphError::ImproperlyConfigured(_)));
        assert!(err.to_string().contains("auth"));
    }

    #[test]
    fn test_explicit_label() {
        let mut registry = AppRegistry::new();
        registry
            .register(Box::new(
                SimpleAppConfig::new("legacy.auth").with_label("legacy_auth"),
            ))
            .unwrap();
        registry
            .register(Box::new(SimpleAppConfig::new("contrib.auth")))
            .unwrap();
        assert!(registry.contains("legacy_auth"));
        assert!(registry.contains("auth"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = AppRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get_app_config("anything").is_none());
    }
}
