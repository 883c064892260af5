//! Wiring shared by the commands: settings to apps, loader, connection and
//! ledger schema.

use std::sync::Arc;

use migraph_core::{AppRegistry, MigraphError, Settings};
use migraph_db_backends::{connect, DatabaseBackend, DatabaseConfig};
use migraph_migrations::{
    AnsiSchemaEditor, FileSystemSource, LedgerSchema, MigrationError, MigrationExecutor,
    MigrationLoader, MigrationRecorder, MigrationSource,
};

/// Everything a command needs to talk to one database.
pub struct Project {
    apps: Arc<AppRegistry>,
    source: Arc<dyn MigrationSource>,
    settings: Settings,
    connection: Box<dyn DatabaseBackend>,
    schema: LedgerSchema,
}

impl Project {
    /// Opens the database `alias` and reads migrations below
    /// `settings.migrations_root`.
    pub fn open(settings: &Settings, alias: &str) -> Result<Self, MigrationError> {
        let db = settings.database(alias).ok_or_else(|| {
            MigraphError::ConfigurationError(format!("The database '{alias}' is not configured"))
        })?;
        let connection = connect(&DatabaseConfig::from_settings(alias, db))?;
        let source = Arc::new(FileSystemSource::new(&settings.migrations_root));
        Self::with_connection(settings, source, connection)
    }

    /// Builds a project over an existing connection and source.
    pub fn with_connection(
        settings: &Settings,
        source: Arc<dyn MigrationSource>,
        connection: Box<dyn DatabaseBackend>,
    ) -> Result<Self, MigrationError> {
        let apps = AppRegistry::from_installed_apps(&settings.installed_apps)?;
        Ok(Self {
            apps: Arc::new(apps),
            source,
            settings: settings.clone(),
            connection,
            schema: LedgerSchema::new(settings.migrations_table.clone()),
        })
    }

    /// Returns the connection.
    pub fn connection(&self) -> &dyn DatabaseBackend {
        &*self.connection
    }

    /// Returns a recorder over the connection.
    pub fn recorder(&self) -> MigrationRecorder<'_> {
        MigrationRecorder::new(&*self.connection, &self.schema)
    }

    /// Creates a loader configured from the settings, without building it.
    pub fn loader(&self) -> MigrationLoader {
        MigrationLoader::new(Arc::clone(&self.apps), Arc::clone(&self.source))
            .with_migration_modules(self.settings.migration_modules.clone())
    }

    /// Creates a loader and builds its graph against the ledger.
    pub async fn built_loader(&self) -> Result<MigrationLoader, MigrationError> {
        let mut loader = self.loader();
        loader.build_graph(Some(&self.recorder())).await?;
        Ok(loader)
    }

    /// Creates an executor with a built graph.
    pub async fn executor(&self) -> Result<MigrationExecutor<'_>, MigrationError> {
        let mut executor = MigrationExecutor::new(
            self.loader(),
            &*self.connection,
            &self.schema,
            Box::new(AnsiSchemaEditor),
        );
        executor.refresh().await?;
        Ok(executor)
    }
}

/// Fails with the conflicting leaves if any app has more than one.
pub fn ensure_no_conflicts(loader: &MigrationLoader) -> Result<(), MigrationError> {
    let conflicts = loader.detect_conflicts();
    if conflicts.is_empty() {
        return Ok(());
    }
    let detail = conflicts
        .iter()
        .map(|(app, names)| format!("{} in {app}", names.join(", ")))
        .collect::<Vec<_>>()
        .join("; ");
    Err(MigraphError::ConfigurationError(format!(
        "Conflicting migrations detected; multiple leaf nodes in the migration graph: ({detail})"
    ))
    .into())
}
