//! Migration execution engine.
//!
//! The [`MigrationExecutor`] turns targets into a [`MigrationPlan`] using the
//! loader's graph and the ledger, then applies or reverts each migration
//! against a [`DatabaseBackend`]. Atomic migrations run inside a
//! transaction together with their ledger update.

use std::collections::BTreeSet;
use std::fmt;

use migraph_core::logging::migrate_span;
use migraph_db_backends::DatabaseBackend;
use tracing::Instrument;

use crate::error::MigrationError;
use crate::loader::{AppliedState, LoaderOptions, MigrationLoader};
use crate::migration::{Migration, MigrationKey};
use crate::recorder::{LedgerSchema, MigrationRecord, MigrationRecorder};
use crate::schema_editor::SchemaEditor;

/// A single step in a migration plan.
///
/// Each step references a migration by key and indicates whether the
/// migration should be applied or reversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    /// The migration key.
    pub migration: MigrationKey,
    /// If `true`, this step reverses the migration.
    pub backwards: bool,
}

impl MigrationStep {
    /// Creates a forward migration step.
    pub fn forward(migration: MigrationKey) -> Self {
        Self {
            migration,
            backwards: false,
        }
    }

    /// Creates a backward (reverse) migration step.
    pub fn backward(migration: MigrationKey) -> Self {
        Self {
            migration,
            backwards: true,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.backwards { "unapply" } else { "apply" };
        write!(f, "{arrow} {}", self.migration)
    }
}

/// An ordered list of [`MigrationStep`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// The ordered steps to execute.
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Creates a new empty migration plan.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Adds a step to the plan.
    pub fn add_step(&mut self, step: MigrationStep) {
        self.steps.push(step);
    }

    /// Returns whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if every step applies.
    pub fn is_all_forwards(&self) -> bool {
        self.steps.iter().all(|s| !s.backwards)
    }

    /// Returns `true` if every step reverts.
    pub fn is_all_backwards(&self) -> bool {
        self.steps.iter().all(|s| s.backwards)
    }
}

/// Where an app should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationTarget {
    /// Migrate the app to exactly this migration.
    Node(MigrationKey),
    /// Unapply every migration of the app.
    Zero(String),
}

impl fmt::Display for MigrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(key) => write!(f, "{key}"),
            Self::Zero(app) => write!(f, "{app} zero"),
        }
    }
}

/// Plans and runs migrations against one database.
pub struct MigrationExecutor<'a> {
    loader: MigrationLoader,
    connection: &'a dyn DatabaseBackend,
    schema: &'a LedgerSchema,
    schema_editor: Box<dyn SchemaEditor>,
}

impl<'a> MigrationExecutor<'a> {
    /// Creates an executor. Call [`refresh`](Self::refresh) before planning.
    pub fn new(
        loader: MigrationLoader,
        connection: &'a dyn DatabaseBackend,
        schema: &'a LedgerSchema,
        schema_editor: Box<dyn SchemaEditor>,
    ) -> Self {
        Self {
            loader,
            connection,
            schema,
            schema_editor,
        }
    }

    /// Returns a recorder over this executor's connection.
    pub fn recorder(&self) -> MigrationRecorder<'a> {
        MigrationRecorder::new(self.connection, self.schema)
    }

    /// Returns the loader.
    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    /// Returns the schema editor.
    pub fn schema_editor(&self) -> &dyn SchemaEditor {
        &*self.schema_editor
    }

    /// Rebuilds the loader's graph from the current ledger.
    pub async fn refresh(&mut self) -> Result<(), MigrationError> {
        let recorder = self.recorder();
        self.loader.build_graph(Some(&recorder)).await
    }

    /// Returns the targets that bring every app to its latest migration.
    pub fn latest_targets(&self) -> Vec<MigrationTarget> {
        self.loader
            .graph()
            .leaf_nodes(None)
            .into_iter()
            .map(MigrationTarget::Node)
            .collect()
    }

    /// Builds the plan reaching `targets` from the applied state of the
    /// last build, or from nothing applied with `clean_start`.
    ///
    /// A target that was replaced by a squash is still reachable: the graph
    /// is rebuilt once without squash reconciliation. The loader options are
    /// left as they were, so the next [`refresh`](Self::refresh) restores
    /// the squashes.
    pub fn migration_plan(
        &mut self,
        targets: &[MigrationTarget],
        clean_start: bool,
    ) -> Result<MigrationPlan, MigrationError> {
        let needs_unsquashed = targets.iter().any(|t| match t {
            MigrationTarget::Node(key) => {
                self.loader.session().is_applied(key) && !self.loader.graph().contains(key)
            }
            MigrationTarget::Zero(_) => false,
        });
        if needs_unsquashed && self.loader.options().replace_migrations {
            tracing::debug!("target was squashed away; rebuilding without replacements");
            let records: Vec<MigrationRecord> = self
                .loader
                .applied_migrations()
                .values()
                .filter_map(|state| match state {
                    AppliedState::Recorded(record) => Some(record.clone()),
                    AppliedState::Squashed => None,
                })
                .collect();
            let options = self.loader.options();
            self.loader.set_options(LoaderOptions {
                replace_migrations: false,
                ..options
            });
            let rebuilt = self.loader.build_graph_with_applied(records);
            self.loader.set_options(options);
            rebuilt?;
        }
        let applied = if clean_start {
            BTreeSet::new()
        } else {
            self.loader.applied_migrations().keys().cloned().collect()
        };
        self.plan_from(targets, applied)
    }

    fn plan_from(
        &self,
        targets: &[MigrationTarget],
        mut applied: BTreeSet<MigrationKey>,
    ) -> Result<MigrationPlan, MigrationError> {
        let graph = self.loader.graph();
        let mut plan = MigrationPlan::new();
        let unapply = |start: &MigrationKey,
                       plan: &mut MigrationPlan,
                       applied: &mut BTreeSet<MigrationKey>|
         -> Result<(), MigrationError> {
            for key in graph.backwards_plan(start)? {
                if applied.remove(&key) {
                    plan.add_step(MigrationStep::backward(key));
                }
            }
            Ok(())
        };

        for target in targets {
            match target {
                MigrationTarget::Zero(app_label) => {
                    for root in graph.root_nodes(Some(app_label)) {
                        unapply(&root, &mut plan, &mut applied)?;
                    }
                }
                MigrationTarget::Node(key) if applied.contains(key) => {
                    let next_in_app: Vec<MigrationKey> = graph
                        .children(key)
                        .into_iter()
                        .filter(|child| child.app_label == key.app_label)
                        .collect();
                    for child in &next_in_app {
                        unapply(child, &mut plan, &mut applied)?;
                    }
                }
                MigrationTarget::Node(key) => {
                    for node in graph.forwards_plan(key)? {
                        if applied.insert(node.clone()) {
                            plan.add_step(MigrationStep::forward(node));
                        }
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Migrates to `targets`, returning the executed plan.
    ///
    /// With `fake` set the ledger is updated without touching the schema.
    /// The graph is rebuilt afterwards, whether or not the run succeeded.
    pub async fn migrate(
        &mut self,
        targets: &[MigrationTarget],
        fake: bool,
    ) -> Result<MigrationPlan, MigrationError> {
        let span = migrate_span(self.connection.alias());
        async {
            let outcome = self.plan_and_run(targets, fake).await;
            let refreshed = self.refresh().await;
            keep_first_error(outcome, refreshed, "graph refresh")
        }
        .instrument(span)
        .await
    }

    async fn plan_and_run(
        &mut self,
        targets: &[MigrationTarget],
        fake: bool,
    ) -> Result<MigrationPlan, MigrationError> {
        self.recorder().ensure_storage().await?;
        let plan = self.migration_plan(targets, false)?;
        if !plan.is_all_forwards() && !plan.is_all_backwards() {
            return Err(MigrationError::InvalidPlan(format!(
                "Migration plans with both forwards and backwards migrations are not \
                 supported. Please split your migration process into separate plans \
                 of only forwards OR backwards migrations. ({} steps)",
                plan.len()
            )));
        }
        if plan.is_empty() {
            tracing::info!("no migrations to apply");
        }

        let result = self.run_plan(&plan, fake).await;
        let checked = self.check_replacements().await;
        keep_first_error(result, checked, "replacement check").map(|()| plan)
    }

    async fn run_plan(&self, plan: &MigrationPlan, fake: bool) -> Result<(), MigrationError> {
        for step in &plan.steps {
            let migration = self.loader.get_migration(&step.migration)?;
            if step.backwards {
                self.unapply_migration(migration, fake).await?;
            } else {
                self.apply_migration(migration, fake).await?;
            }
        }
        Ok(())
    }

    async fn apply_migration(&self, migration: &Migration, fake: bool) -> Result<(), MigrationError> {
        let key = migration.key();
        tracing::info!(migration = %key, fake, "applying migration");
        let sql = if fake {
            Vec::new()
        } else {
            let mut state = self
                .loader
                .project_state(Some(std::slice::from_ref(&key)), false)?;
            migration.apply(&mut state, &*self.schema_editor)?
        };
        self.run_in_transaction(migration.atomic, async {
            self.execute_all(&sql).await?;
            self.record_applied(migration).await
        })
        .await
    }

    async fn unapply_migration(&self, migration: &Migration, fake: bool) -> Result<(), MigrationError> {
        let key = migration.key();
        tracing::info!(migration = %key, fake, "unapplying migration");
        let sql = if fake {
            Vec::new()
        } else {
            let before = self
                .loader
                .project_state(Some(std::slice::from_ref(&key)), false)?;
            migration.unapply(&before, &*self.schema_editor)?
        };
        self.run_in_transaction(migration.atomic, async {
            self.execute_all(&sql).await?;
            let recorder = self.recorder();
            for replaced in &migration.replaces {
                recorder
                    .record_unapplied(&replaced.app_label, &replaced.name)
                    .await?;
            }
            recorder.record_unapplied(&key.app_label, &key.name).await
        })
        .await
    }

    async fn run_in_transaction(
        &self,
        atomic: bool,
        work: impl std::future::Future<Output = Result<(), MigrationError>>,
    ) -> Result<(), MigrationError> {
        if !atomic {
            return work.await;
        }
        self.connection.begin().await?;
        match work.await {
            Ok(()) => {
                self.connection.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.connection.rollback().await {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn execute_all(&self, statements: &[String]) -> Result<(), MigrationError> {
        for sql in statements {
            if sql.starts_with("--") {
                continue;
            }
            tracing::debug!(sql = %sql, "executing");
            self.connection.execute(sql, &[]).await?;
        }
        Ok(())
    }

    /// A squash records its replaced migrations; the squash itself is
    /// recorded by [`check_replacements`](Self::check_replacements).
    async fn record_applied(&self, migration: &Migration) -> Result<(), MigrationError> {
        let recorder = self.recorder();
        if migration.is_squash() {
            for replaced in &migration.replaces {
                recorder
                    .record_applied(&replaced.app_label, &replaced.name)
                    .await?;
            }
            Ok(())
        } else {
            recorder
                .record_applied(&migration.app_label, &migration.name)
                .await
        }
    }

    /// Records every squash whose replaced migrations are all applied.
    pub async fn check_replacements(&self) -> Result<(), MigrationError> {
        let recorder = self.recorder();
        let applied = recorder.applied_migrations().await?;
        for (key, migration) in self.loader.replacements() {
            let all_applied = migration.replaces.iter().all(|k| applied.contains_key(k));
            if all_applied && !applied.contains_key(key) {
                recorder.record_applied(&key.app_label, &key.name).await?;
            }
        }
        Ok(())
    }
}

/// Returns `primary`, or the error of `cleanup` when only the cleanup failed.
/// A cleanup error following a primary error is logged and dropped.
fn keep_first_error<T>(
    primary: Result<T, MigrationError>,
    cleanup: Result<(), MigrationError>,
    cleanup_name: &str,
) -> Result<T, MigrationError> {
    match (primary, cleanup) {
        (Ok(value), cleanup) => cleanup.map(|()| value),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(secondary)) => {
            tracing::warn!(error = %secondary, "{cleanup_name} failed after an earlier error");
            Err(e)
        }
    }
}
