//! Migration loader.
//!
//! The [`MigrationLoader`] discovers migrations for every installed app
//! through a [`MigrationSource`], builds the [`MigrationGraph`] from their
//! declared dependencies, merges in the ledger, resolves squashed
//! migrations, and validates the result.
//!
//! Every build starts from scratch and produces a fresh [`LoaderSession`].
//! A failed build leaves an empty session behind, never a partial graph.
//! Any change to the ledger invalidates the session; build again after
//! applying or unapplying migrations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use migraph_core::AppRegistry;

use crate::error::MigrationError;
use crate::executor::MigrationPlan;
use crate::graph::{EdgeKind, MigrationGraph};
use crate::migration::{Migration, MigrationKey, FIRST};
use crate::recorder::{MigrationRecord, MigrationRecorder};
use crate::schema_editor::SchemaEditor;
use crate::source::{MigrationSource, ModuleLookup};
use crate::state::ProjectState;

/// Name of the per-app migrations module when no override is configured.
pub const MIGRATIONS_MODULE_NAME: &str = "migrations";

/// Loader behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Resolve sentinels against migrated apps without migrations to
    /// nothing instead of failing, and tolerate missing explicit modules.
    pub ignore_no_migrations: bool,
    /// Reconcile squashed migrations against the ledger.
    pub replace_migrations: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            ignore_no_migrations: false,
            replace_migrations: true,
        }
    }
}

/// Why a migration counts as applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedState {
    /// The ledger has a row for it.
    Recorded(MigrationRecord),
    /// It is a squash whose replaced migrations are all recorded.
    Squashed,
}

/// Everything one build produced.
#[derive(Debug, Default)]
pub struct LoaderSession {
    /// Every discovered migration.
    pub disk_migrations: BTreeMap<MigrationKey, Arc<Migration>>,
    /// Ledger snapshot, adjusted for squashed migrations.
    pub applied_migrations: BTreeMap<MigrationKey, AppliedState>,
    /// Apps without a migrations module.
    pub unmigrated_apps: BTreeSet<String>,
    /// Apps with a migrations module.
    pub migrated_apps: BTreeSet<String>,
    /// The validated graph.
    pub graph: MigrationGraph,
    /// Squashed migrations, keyed by their own key.
    pub replacements: BTreeMap<MigrationKey, Arc<Migration>>,
}

impl LoaderSession {
    /// Resolves `__first__` / `__latest__` in a dependency of `current_app`.
    ///
    /// Returns `Ok(None)` when the dependency should be dropped.
    pub fn check_key(
        &self,
        key: &MigrationKey,
        current_app: &str,
        ignore_no_migrations: bool,
    ) -> Result<Option<MigrationKey>, MigrationError> {
        if !key.is_sentinel() || self.graph.contains(key) {
            return Ok(Some(key.clone()));
        }
        if key.app_label == current_app || self.unmigrated_apps.contains(&key.app_label) {
            return Ok(None);
        }
        if self.migrated_apps.contains(&key.app_label) {
            let candidates = if key.name == FIRST {
                self.graph.root_nodes(Some(&key.app_label))
            } else {
                self.graph.leaf_nodes(Some(&key.app_label))
            };
            return match candidates.into_iter().next() {
                Some(resolved) => Ok(Some(resolved)),
                None if ignore_no_migrations => Ok(None),
                None => Err(MigrationError::DependencyResolution(format!(
                    "Dependency on app with no migrations: {}",
                    key.app_label
                ))),
            };
        }
        Err(MigrationError::DependencyResolution(format!(
            "Dependency on unknown app: {}",
            key.app_label
        )))
    }

    /// Returns `true` if `key` counts as applied.
    pub fn is_applied(&self, key: &MigrationKey) -> bool {
        self.applied_migrations.contains_key(key)
    }
}

/// Discovers migrations and builds the dependency graph.
pub struct MigrationLoader {
    apps: Arc<AppRegistry>,
    source: Arc<dyn MigrationSource>,
    migration_modules: BTreeMap<String, Option<String>>,
    options: LoaderOptions,
    session: LoaderSession,
}

impl MigrationLoader {
    /// Creates a loader over the given apps and discovery source.
    ///
    /// No graph is built until [`build_graph`](Self::build_graph) is called.
    pub fn new(apps: Arc<AppRegistry>, source: Arc<dyn MigrationSource>) -> Self {
        Self {
            apps,
            source,
            migration_modules: BTreeMap::new(),
            options: LoaderOptions::default(),
            session: LoaderSession::default(),
        }
    }

    /// Sets per-app module overrides; `None` disables migrations for an app.
    #[must_use]
    pub fn with_migration_modules(mut self, modules: BTreeMap<String, Option<String>>) -> Self {
        self.migration_modules = modules;
        self
    }

    /// Sets the loader options.
    #[must_use]
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the loader options; takes effect on the next build.
    pub fn set_options(&mut self, options: LoaderOptions) {
        self.options = options;
    }

    /// Returns the loader options.
    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Returns the migrations module of an app and whether it was set
    /// explicitly.
    pub fn migrations_module(&self, app_label: &str) -> (Option<String>, bool) {
        if let Some(module) = self.migration_modules.get(app_label) {
            return (module.clone(), true);
        }
        let module = self
            .apps
            .get_app_config(app_label)
            .map(|app| format!("{}.{MIGRATIONS_MODULE_NAME}", app.name()));
        (module, false)
    }

    /// Builds the graph, reading the ledger through `recorder` if given.
    ///
    /// Without a recorder nothing counts as applied.
    pub async fn build_graph(
        &mut self,
        recorder: Option<&MigrationRecorder<'_>>,
    ) -> Result<(), MigrationError> {
        let applied = match recorder {
            Some(recorder) => recorder.applied_migrations().await?,
            None => BTreeMap::new(),
        };
        self.build_graph_with_applied(applied.into_values())
    }

    /// Builds the graph against an explicit ledger snapshot.
    pub fn build_graph_with_applied(
        &mut self,
        applied: impl IntoIterator<Item = MigrationRecord>,
    ) -> Result<(), MigrationError> {
        match self.build_session(applied) {
            Ok(session) => {
                tracing::debug!(
                    graph = %session.graph,
                    applied = session.applied_migrations.len(),
                    "migration graph built"
                );
                self.session = session;
                Ok(())
            }
            Err(e) => {
                self.session = LoaderSession::default();
                Err(e)
            }
        }
    }

    fn build_session(
        &self,
        applied: impl IntoIterator<Item = MigrationRecord>,
    ) -> Result<LoaderSession, MigrationError> {
        let mut session = LoaderSession::default();
        self.load_disk(&mut session)?;
        session.applied_migrations = applied
            .into_iter()
            .map(|record| (record.key(), AppliedState::Recorded(record)))
            .collect();

        for (key, migration) in &session.disk_migrations {
            session.graph.add_node(key.clone(), Arc::clone(migration))?;
            if migration.is_squash() {
                session
                    .replacements
                    .insert(key.clone(), Arc::clone(migration));
            }
        }

        let disk: Vec<Arc<Migration>> = session.disk_migrations.values().cloned().collect();
        for migration in &disk {
            Self::add_internal_dependencies(&mut session, migration)?;
        }
        for migration in &disk {
            self.add_external_dependencies(&mut session, migration)?;
        }

        if self.options.replace_migrations {
            Self::reconcile_replacements(&mut session)?;
        }

        if let Err(e) = session.graph.validate_consistency() {
            return Err(Self::explain_missing_node(&session, e));
        }
        session.graph.ensure_not_cyclic()?;
        Ok(session)
    }

    fn load_disk(&self, session: &mut LoaderSession) -> Result<(), MigrationError> {
        for app in self.apps.get_app_configs() {
            let label = app.label();
            let (module, explicit) = self.migrations_module(label);
            let Some(module) = module else {
                session.unmigrated_apps.insert(label.to_string());
                continue;
            };

            let entries = match self.source.open_module(&module)? {
                ModuleLookup::Missing => {
                    if explicit && !self.options.ignore_no_migrations {
                        return Err(MigrationError::Discovery(format!(
                            "Migrations module {module} for app {label} could not be found"
                        )));
                    }
                    session.unmigrated_apps.insert(label.to_string());
                    continue;
                }
                ModuleLookup::NotAPackage => {
                    session.unmigrated_apps.insert(label.to_string());
                    continue;
                }
                ModuleLookup::Package(entries) if entries.is_empty() => {
                    session.unmigrated_apps.insert(label.to_string());
                    continue;
                }
                ModuleLookup::Package(entries) => entries,
            };

            session.migrated_apps.insert(label.to_string());
            for entry in entries {
                if entry.is_package || entry.name.starts_with(['_', '~']) {
                    continue;
                }
                let migration = self
                    .source
                    .load_migration(&module, &entry.name)?
                    .ok_or_else(|| MigrationError::BadMigration {
                        app_label: label.to_string(),
                        name: entry.name.clone(),
                    })?
                    .with_identity(label, entry.name.as_str());
                session
                    .disk_migrations
                    .insert(migration.key(), Arc::new(migration));
            }
            tracing::debug!(app = label, module = %module, "discovered migrations module");
        }
        Ok(())
    }

    fn add_internal_dependencies(
        session: &mut LoaderSession,
        migration: &Migration,
    ) -> Result<(), MigrationError> {
        let key = migration.key();
        for parent in &migration.dependencies {
            if parent.app_label == key.app_label && parent.name != FIRST {
                session
                    .graph
                    .add_dependency(&key, key.clone(), parent.clone(), EdgeKind::Provisional)?;
            }
        }
        Ok(())
    }

    fn add_external_dependencies(
        &self,
        session: &mut LoaderSession,
        migration: &Migration,
    ) -> Result<(), MigrationError> {
        let key = migration.key();
        let ignore = self.options.ignore_no_migrations;
        for parent in &migration.dependencies {
            if parent.app_label == key.app_label {
                continue;
            }
            if let Some(parent) = session.check_key(parent, &key.app_label, ignore)? {
                session
                    .graph
                    .add_dependency(&key, key.clone(), parent, EdgeKind::Provisional)?;
            }
        }
        for child in &migration.run_before {
            if let Some(child) = session.check_key(child, &key.app_label, ignore)? {
                session
                    .graph
                    .add_dependency(&key, child, key.clone(), EdgeKind::Provisional)?;
            }
        }
        Ok(())
    }

    /// A squash stands in for its targets when all or none of them are
    /// applied. Otherwise the targets stay and the squash is dropped.
    fn reconcile_replacements(session: &mut LoaderSession) -> Result<(), MigrationError> {
        let replacements: Vec<(MigrationKey, Arc<Migration>)> = session
            .replacements
            .iter()
            .map(|(k, m)| (k.clone(), Arc::clone(m)))
            .collect();
        for (key, migration) in replacements {
            let applied_count = migration
                .replaces
                .iter()
                .filter(|k| session.applied_migrations.contains_key(k))
                .count();
            let all_applied = applied_count == migration.replaces.len();

            if all_applied {
                session
                    .applied_migrations
                    .insert(key.clone(), AppliedState::Squashed);
            } else {
                session.applied_migrations.remove(&key);
            }

            if all_applied || applied_count == 0 {
                session
                    .graph
                    .remove_replaced_nodes(&key, &migration.replaces)?;
            } else {
                tracing::warn!(
                    migration = %key,
                    applied = applied_count,
                    replaces = migration.replaces.len(),
                    "squashed migration is partially applied; keeping the replaced migrations"
                );
                session
                    .graph
                    .remove_replacement_node(&key, &migration.replaces)?;
            }
        }
        Ok(())
    }

    /// Adds context to a dangling reference to a squashed-away migration.
    fn explain_missing_node(session: &LoaderSession, err: MigrationError) -> MigrationError {
        let MigrationError::NodeNotFound { node, origin, .. } = &err else {
            return err;
        };
        let candidates: BTreeSet<&MigrationKey> = session
            .replacements
            .iter()
            .filter(|(_, m)| m.replaces.contains(node))
            .map(|(k, _)| k)
            .collect();
        if candidates.is_empty() || candidates.iter().any(|k| session.graph.contains(k)) {
            return err;
        }
        let tries = candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let origin_name = origin
            .as_ref()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        MigrationError::NodeNotFound {
            message: format!(
                "Migration {origin_name} depends on nonexistent node ('{}', '{}'). \
                 Tried to replace migration {node} with any of [{tries}] but wasn't able \
                 to because some of the replaced migrations are already applied.",
                node.app_label, node.name
            ),
            node: node.clone(),
            origin: origin.clone(),
        }
    }

    /// Returns the session of the last successful build.
    pub fn session(&self) -> &LoaderSession {
        &self.session
    }

    /// Returns the graph of the last successful build.
    pub fn graph(&self) -> &MigrationGraph {
        &self.session.graph
    }

    /// Returns the applied migrations of the last build.
    pub fn applied_migrations(&self) -> &BTreeMap<MigrationKey, AppliedState> {
        &self.session.applied_migrations
    }

    /// Returns the discovered migrations of the last build.
    pub fn disk_migrations(&self) -> &BTreeMap<MigrationKey, Arc<Migration>> {
        &self.session.disk_migrations
    }

    /// Returns the squashed migrations of the last build.
    pub fn replacements(&self) -> &BTreeMap<MigrationKey, Arc<Migration>> {
        &self.session.replacements
    }

    /// Returns the apps without migrations.
    pub fn unmigrated_apps(&self) -> &BTreeSet<String> {
        &self.session.unmigrated_apps
    }

    /// Returns the apps with migrations.
    pub fn migrated_apps(&self) -> &BTreeSet<String> {
        &self.session.migrated_apps
    }

    /// Resolves a sentinel dependency against the current graph.
    pub fn check_key(
        &self,
        key: &MigrationKey,
        current_app: &str,
    ) -> Result<Option<MigrationKey>, MigrationError> {
        self.session
            .check_key(key, current_app, self.options.ignore_no_migrations)
    }

    /// Looks up a migration in the graph.
    pub fn get_migration(&self, key: &MigrationKey) -> Result<&Arc<Migration>, MigrationError> {
        self.session
            .graph
            .node(key)
            .ok_or_else(|| MigrationError::node_not_found(key.clone(), None))
    }

    /// Finds the single discovered migration of `app_label` whose name starts
    /// with `prefix`.
    pub fn get_migration_by_prefix(
        &self,
        app_label: &str,
        prefix: &str,
    ) -> Result<&Arc<Migration>, MigrationError> {
        let mut matches = self
            .session
            .disk_migrations
            .iter()
            .filter(|(k, _)| k.app_label == app_label && k.name.starts_with(prefix))
            .map(|(_, m)| m);
        match (matches.next(), matches.next()) {
            (Some(migration), None) => Ok(migration),
            (Some(_), Some(_)) => Err(MigrationError::Ambiguity {
                app_label: app_label.to_string(),
                prefix: prefix.to_string(),
            }),
            (None, _) => Err(MigrationError::MigrationNotFound {
                app_label: app_label.to_string(),
                prefix: prefix.to_string(),
            }),
        }
    }

    /// Fails if any applied migration has an unapplied dependency.
    ///
    /// A parent that is an unapplied squash with every replaced migration
    /// applied is accepted.
    pub async fn check_consistent_history(
        &self,
        recorder: &MigrationRecorder<'_>,
    ) -> Result<(), MigrationError> {
        let applied = recorder.applied_migrations().await?;
        let graph = &self.session.graph;
        for key in applied.keys() {
            if !graph.contains(key) {
                continue;
            }
            for parent in graph.parents(key) {
                if applied.contains_key(&parent) {
                    continue;
                }
                if let Some(squash) = self.session.replacements.get(&parent) {
                    if squash.replaces.iter().all(|k| applied.contains_key(k)) {
                        continue;
                    }
                }
                return Err(MigrationError::InconsistentHistory {
                    migration: key.clone(),
                    dependency: parent,
                    alias: recorder.alias().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns apps with more than one leaf, mapped to the sorted leaf names.
    pub fn detect_conflicts(&self) -> BTreeMap<String, Vec<String>> {
        let mut leaves: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in self.session.graph.leaf_nodes(None) {
            leaves.entry(key.app_label).or_default().push(key.name);
        }
        leaves.retain(|_, names| names.len() > 1);
        leaves
    }

    /// Returns the project state at the given nodes, see
    /// [`MigrationGraph::make_state`]. Unmigrated apps are always included.
    pub fn project_state(
        &self,
        nodes: Option<&[MigrationKey]>,
        at_end: bool,
    ) -> Result<ProjectState, MigrationError> {
        self.session
            .graph
            .make_state(nodes, at_end, &self.session.unmigrated_apps)
    }

    /// Returns the SQL `plan` would run, without running it.
    pub fn collect_sql(
        &self,
        plan: &MigrationPlan,
        schema_editor: &dyn SchemaEditor,
    ) -> Result<Vec<String>, MigrationError> {
        let mut statements = Vec::new();
        let mut state: Option<ProjectState> = None;
        for step in &plan.steps {
            let migration = self.get_migration(&step.migration)?;
            let nodes = std::slice::from_ref(&step.migration);
            if step.backwards {
                let before = self.project_state(Some(nodes), false)?;
                statements.extend(migration.unapply(&before, schema_editor)?);
                state = None;
            } else {
                let mut current = match state.take() {
                    Some(current) => current,
                    None => self.project_state(Some(nodes), false)?,
                };
                statements.extend(migration.apply(&mut current, schema_editor)?);
                state = Some(current);
            }
        }
        Ok(statements)
    }
}
