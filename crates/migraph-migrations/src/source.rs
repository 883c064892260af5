//! Migration discovery sources.
//!
//! The loader never imports code. It asks a [`MigrationSource`] to list the
//! entries of a migrations module and to produce the [`Migration`] for an
//! entry. Two sources are provided:
//!
//! - [`StaticSource`]: migrations registered programmatically.
//! - [`FileSystemSource`]: one JSON file per migration under a root
//!   directory, where module `blog.migrations` lives in `<root>/blog/migrations/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::MigrationError;
use crate::migration::{Migration, MigrationKey};
use crate::operations::{AddField, CreateModel, DeleteModel, RemoveField, RunSql};

/// One entry of a migrations module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// The entry name, without any extension.
    pub name: String,
    /// Whether the entry is itself a package (never a migration).
    pub is_package: bool,
}

impl ModuleEntry {
    /// A migration unit entry.
    pub fn unit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_package: false,
        }
    }

    /// A nested package entry.
    pub fn package(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_package: true,
        }
    }
}

/// Result of looking up a migrations module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleLookup {
    /// The module is a package with these entries.
    Package(Vec<ModuleEntry>),
    /// The module exists but is a single unit, not a package.
    NotAPackage,
    /// The module does not exist.
    Missing,
}

/// A discovery capability for migration units.
pub trait MigrationSource: Send + Sync {
    /// Lists the entries of `module`.
    fn open_module(&self, module: &str) -> Result<ModuleLookup, MigrationError>;

    /// Instantiates the unit `name` of `module`.
    ///
    /// `Ok(None)` means the entry exists but does not describe a migration.
    fn load_migration(&self, module: &str, name: &str)
        -> Result<Option<Migration>, MigrationError>;
}

#[derive(Debug, Clone)]
enum StaticEntry {
    Unit(Migration),
    Package,
    Invalid,
}

/// An in-memory source populated by registration.
///
/// # Examples
///
/// ```
/// use migraph_migrations::{Migration, StaticSource};
///
/// let source = StaticSource::new()
///     .with_migration("blog.migrations", Migration::new("blog", "0001_initial"))
///     .with_migration(
///         "blog.migrations",
///         Migration::new("blog", "0002_tags").depends_on("blog", "0001_initial"),
///     );
/// # let _ = source;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    /// `None` marks a plain, non-package module.
    modules: BTreeMap<String, Option<BTreeMap<String, StaticEntry>>>,
}

impl StaticSource {
    /// Creates an empty source; every module is missing.
    pub fn new() -> Self {
        Self::default()
    }

    fn package(&mut self, module: &str) -> &mut BTreeMap<String, StaticEntry> {
        self.modules
            .entry(module.to_string())
            .or_default()
            .get_or_insert_with(BTreeMap::new)
    }

    /// Registers `migration` under `module`, keyed by its name.
    pub fn add_migration(&mut self, module: &str, migration: Migration) {
        let name = migration.name.clone();
        self.package(module).insert(name, StaticEntry::Unit(migration));
    }

    /// Builder form of [`StaticSource::add_migration`].
    #[must_use]
    pub fn with_migration(mut self, module: &str, migration: Migration) -> Self {
        self.add_migration(module, migration);
        self
    }

    /// Registers an empty package.
    pub fn add_empty_package(&mut self, module: &str) {
        self.package(module);
    }

    /// Registers a nested package entry inside `module`.
    pub fn add_subpackage(&mut self, module: &str, name: &str) {
        self.package(module)
            .insert(name.to_string(), StaticEntry::Package);
    }

    /// Registers an entry that carries no migration.
    pub fn add_invalid(&mut self, module: &str, name: &str) {
        self.package(module)
            .insert(name.to_string(), StaticEntry::Invalid);
    }

    /// Registers `module` as a plain (non-package) module.
    pub fn add_plain_module(&mut self, module: &str) {
        self.modules.insert(module.to_string(), None);
    }
}

impl MigrationSource for StaticSource {
    fn open_module(&self, module: &str) -> Result<ModuleLookup, MigrationError> {
        Ok(match self.modules.get(module) {
            None => ModuleLookup::Missing,
            Some(None) => ModuleLookup::NotAPackage,
            Some(Some(entries)) => ModuleLookup::Package(
                entries
                    .iter()
                    .map(|(name, entry)| match entry {
                        StaticEntry::Package => ModuleEntry::package(name.clone()),
                        _ => ModuleEntry::unit(name.clone()),
                    })
                    .collect(),
            ),
        })
    }

    fn load_migration(
        &self,
        module: &str,
        name: &str,
    ) -> Result<Option<Migration>, MigrationError> {
        let entry = self
            .modules
            .get(module)
            .and_then(Option::as_ref)
            .and_then(|entries| entries.get(name));
        Ok(match entry {
            Some(StaticEntry::Unit(migration)) => Some(migration.clone()),
            _ => None,
        })
    }
}

/// On-disk form of a migration unit.
///
/// Identity fields are optional; the loader stamps the identity from the
/// module and file name.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationFile {
    /// Ignored if present.
    #[serde(default)]
    pub app_label: Option<String>,
    /// Ignored if present.
    #[serde(default)]
    pub name: Option<String>,
    /// Dependencies as `[app_label, name]` pairs.
    pub dependencies: Vec<(String, String)>,
    /// Migrations that must run after this one.
    #[serde(default)]
    pub run_before: Vec<(String, String)>,
    /// Migrations this one replaces.
    #[serde(default)]
    pub replaces: Vec<(String, String)>,
    /// Whether this is the initial migration. Carried into
    /// [`Migration::initial`](crate::Migration) as-is.
    #[serde(default)]
    pub initial: bool,
    /// Whether to run in a single transaction.
    #[serde(default = "default_atomic")]
    pub atomic: bool,
    /// The operations to apply.
    pub operations: Vec<OperationFile>,
}

const fn default_atomic() -> bool {
    true
}

/// On-disk form of a single operation, tagged by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum OperationFile {
    /// See [`CreateModel`].
    CreateModel(CreateModel),
    /// See [`DeleteModel`].
    DeleteModel(DeleteModel),
    /// See [`AddField`].
    AddField(AddField),
    /// See [`RemoveField`].
    RemoveField(RemoveField),
    /// See [`RunSql`].
    RunSql(RunSql),
}

impl MigrationFile {
    /// Parses a migration file.
    ///
    /// Malformed JSON is a [`MigrationError::Discovery`]; well-formed JSON of
    /// the wrong shape yields `Ok(None)`.
    pub fn parse(json: &str, origin: &str) -> Result<Option<Self>, MigrationError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| MigrationError::Discovery(format!("Invalid migration {origin}: {e}")))?;
        match serde_json::from_value(value) {
            Ok(file) => Ok(Some(file)),
            Err(e) => {
                tracing::debug!(migration = origin, error = %e, "not a migration definition");
                Ok(None)
            }
        }
    }

    /// Converts the file into a migration with an empty identity.
    pub fn into_migration(self) -> Migration {
        let keys = |pairs: Vec<(String, String)>| -> Vec<MigrationKey> {
            pairs.into_iter().map(MigrationKey::from).collect()
        };
        let mut migration = Migration::new(String::new(), String::new());
        migration.dependencies = keys(self.dependencies);
        migration.run_before = keys(self.run_before);
        migration.replaces = keys(self.replaces);
        migration.initial = self.initial;
        migration.atomic = self.atomic;
        for op in self.operations {
            migration = match op {
                OperationFile::CreateModel(op) => migration.add_operation(op),
                OperationFile::DeleteModel(op) => migration.add_operation(op),
                OperationFile::AddField(op) => migration.add_operation(op),
                OperationFile::RemoveField(op) => migration.add_operation(op),
                OperationFile::RunSql(op) => migration.add_operation(op),
            };
        }
        migration
    }
}

/// Reads migrations from JSON files below a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a dotted module path to its directory.
    pub fn module_dir(&self, module: &str) -> PathBuf {
        module
            .split('.')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl MigrationSource for FileSystemSource {
    fn open_module(&self, module: &str) -> Result<ModuleLookup, MigrationError> {
        let dir = self.module_dir(module);
        if !dir.is_dir() {
            return Ok(if dir.is_file() || dir.with_extension("json").is_file() {
                ModuleLookup::NotAPackage
            } else {
                ModuleLookup::Missing
            });
        }

        let read_err = |e: std::io::Error| {
            MigrationError::Discovery(format!(
                "Cannot read migrations module {module} ({}): {e}",
                dir.display()
            ))
        };
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.is_dir() {
                entries.push(ModuleEntry::package(stem));
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                entries.push(ModuleEntry::unit(stem));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ModuleLookup::Package(entries))
    }

    fn load_migration(
        &self,
        module: &str,
        name: &str,
    ) -> Result<Option<Migration>, MigrationError> {
        let path = self.module_dir(module).join(format!("{name}.json"));
        let content = std::fs::read_to_string(&path).map_err(|e| {
            MigrationError::Discovery(format!(
                "Cannot read migration {module}.{name} ({}): {e}",
                path.display()
            ))
        })?;
        Ok(MigrationFile::parse(&content, &format!("{module}.{name}"))?
            .map(MigrationFile::into_migration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_lookup() {
        let mut source = StaticSource::new()
            .with_migration("blog.migrations", Migration::new("blog", "0002_tags"))
            .with_migration("blog.migrations", Migration::new("blog", "0001_initial"));
        source.add_subpackage("blog.migrations", "fixtures");
        source.add_plain_module("shop.migrations");

        assert_eq!(
            source.open_module("blog.migrations").unwrap(),
            ModuleLookup::Package(vec![
                ModuleEntry::unit("0001_initial"),
                ModuleEntry::unit("0002_tags"),
                ModuleEntry::package("fixtures"),
            ])
        );
        assert_eq!(
            source.open_module("shop.migrations").unwrap(),
            ModuleLookup::NotAPackage
        );
        assert_eq!(
            source.open_module("nope.migrations").unwrap(),
            ModuleLookup::Missing
        );
    }

    #[test]
    fn test_static_source_load() {
        let mut source =
            StaticSource::new().with_migration("m", Migration::new("blog", "0001_initial"));
        source.add_invalid("m", "0002_broken");

        let m = source.load_migration("m", "0001_initial").unwrap().unwrap();
        assert_eq!(m.name, "0001_initial");
        assert!(source.load_migration("m", "0002_broken").unwrap().is_none());
        assert!(source.load_migration("m", "0003_absent").unwrap().is_none());
    }

    #[test]
    fn test_migration_file_parse() {
        let json = r#"{
            "dependencies": [["auth", "__first__"]],
            "replaces": [["blog", "0001_initial"], ["blog", "0002_tags"]],
            "operations": [
                {"type": "CreateModel", "name": "Post", "fields": [
                    {"name": "id", "column_type": "INTEGER", "primary_key": true}
                ]},
                {"type": "RunSql", "sql": "SELECT 1", "reverse_sql": "SELECT 2"}
            ]
        }"#;
        let m = MigrationFile::parse(json, "blog.0001_squashed")
            .unwrap()
            .unwrap()
            .into_migration();
        assert_eq!(m.dependencies, vec![MigrationKey::new("auth", "__first__")]);
        assert_eq!(m.replaces.len(), 2);
        assert_eq!(m.operations.len(), 2);
        assert!(m.atomic);
        assert!(m.operations[1].reversible());
    }

    #[test]
    fn test_migration_file_wrong_shape() {
        assert!(MigrationFile::parse(r#"{"hello": "world"}"#, "x.y")
            .unwrap()
            .is_none());
        assert!(MigrationFile::parse("[1, 2, 3]", "x.y").unwrap().is_none());
        assert!(MigrationFile::parse(
            r#"{"dependencies": [], "operations": [{"type": "Teleport"}]}"#,
            "x.y"
        )
        .unwrap()
        .is_none());
    }

    #[test]
    fn test_migration_file_invalid_json() {
        let err = MigrationFile::parse("{not json", "blog.0001").unwrap_err();
        assert!(matches!(err, MigrationError::Discovery(msg) if msg.contains("blog.0001")));
    }

    #[test]
    fn test_filesystem_source() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("blog").join("migrations");
        std::fs::create_dir_all(module.join("fixtures")).unwrap();
        std::fs::write(
            module.join("0001_initial.json"),
            r#"{"dependencies": [], "initial": true, "operations": []}"#,
        )
        .unwrap();
        std::fs::write(module.join("README.md"), "notes").unwrap();
        std::fs::create_dir_all(dir.path().join("shop")).unwrap();
        std::fs::write(dir.path().join("shop").join("migrations.json"), "{}").unwrap();

        let source = FileSystemSource::new(dir.path());
        assert_eq!(source.module_dir("blog.migrations"), module);
        assert_eq!(
            source.open_module("blog.migrations").unwrap(),
            ModuleLookup::Package(vec![
                ModuleEntry::unit("0001_initial"),
                ModuleEntry::package("fixtures"),
            ])
        );
        assert_eq!(
            source.open_module("shop.migrations").unwrap(),
            ModuleLookup::NotAPackage
        );
        assert_eq!(
            source.open_module("auth.migrations").unwrap(),
            ModuleLookup::Missing
        );

        let m = source
            .load_migration("blog.migrations", "0001_initial")
            .unwrap()
            .unwrap();
        assert!(m.initial);
        assert!(matches!(
            source.load_migration("blog.migrations", "0009_absent"),
            Err(MigrationError::Discovery(_))
        ));
    }
}
