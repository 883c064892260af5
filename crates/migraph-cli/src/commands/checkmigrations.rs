//! The `checkmigrations` management command.
//!
//! Builds the migration graph and verifies it against the ledger: no app may
//! have more than one leaf, and no applied migration may have an unapplied
//! dependency. Any failure is returned as an error so the process exits
//! non-zero.

use async_trait::async_trait;
use migraph_core::Settings;
use migraph_migrations::{MigrationError, MigrationLoader, MigrationRecorder};

use crate::command::ManagementCommand;
use crate::project::{ensure_no_conflicts, Project};

/// Validates the migration graph and the applied history.
pub struct CheckmigrationsCommand;

/// Runs every check against an already built loader.
pub async fn check(
    loader: &MigrationLoader,
    recorder: &MigrationRecorder<'_>,
) -> Result<(), MigrationError> {
    ensure_no_conflicts(loader)?;
    loader.check_consistent_history(recorder).await
}

#[async_trait]
impl ManagementCommand for CheckmigrationsCommand {
    fn name(&self) -> &'static str {
        "checkmigrations"
    }

    fn help(&self) -> &'static str {
        "Check the migration graph for conflicts and inconsistent history"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("database")
                .long("database")
                .default_value("default")
                .help("Database alias to check"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), MigrationError> {
        let database = matches
            .get_one::<String>("database")
            .map_or("default", String::as_str);

        let project = Project::open(settings, database)?;
        let loader = project.built_loader().await?;
        check(&loader, &project.recorder()).await?;

        tracing::info!(graph = %loader.graph(), database, "migration graph is consistent");
        println!("System check identified no issues ({}).", loader.graph());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use migraph_db_backends::SqliteBackend;
    use migraph_migrations::{Migration, StaticSource};

    use super::*;

    fn project(source: StaticSource) -> Project {
        let settings = Settings {
            installed_apps: vec!["X".into()],
            ..Settings::default()
        };
        Project::with_connection(
            &settings,
            Arc::new(source),
            Box::new(SqliteBackend::memory().unwrap()),
        )
        .unwrap()
    }

    fn linear() -> StaticSource {
        StaticSource::new()
            .with_migration("X.migrations", Migration::new("", "0001"))
            .with_migration("X.migrations", Migration::new("", "0002").depends_on("X", "0001"))
    }

    #[tokio::test]
    async fn test_check_passes() {
        let project = project(linear());
        project.recorder().record_applied("X", "0001").await.unwrap();
        let loader = project.built_loader().await.unwrap();
        check(&loader, &project.recorder()).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_reports_inconsistent_history() {
        let project = project(linear());
        project.recorder().record_applied("X", "0002").await.unwrap();
        let loader = project.built_loader().await.unwrap();
        let err = check(&loader, &project.recorder()).await.unwrap_err();
        assert!(matches!(err, MigrationError::InconsistentHistory { .. }));
    }

    #[tokio::test]
    async fn test_check_reports_conflicts() {
        let source = linear().with_migration(
            "X.migrations",
            Migration::new("", "0002_other").depends_on("X", "0001"),
        );
        let project = project(source);
        let loader = project.built_loader().await.unwrap();
        let err = check(&loader, &project.recorder()).await.unwrap_err();
        assert!(err.to_string().contains("0002, 0002_other in X"));
    }
}
