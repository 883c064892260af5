//! The `migrate` management command.
//!
//! Brings the database to the requested migration state. Targets can be an
//! app's latest migration, a migration name prefix, `zero`, or every app's
//! latest migration when no app is given.

use async_trait::async_trait;
use migraph_core::{MigraphError, Settings};
use migraph_migrations::{MigrationError, MigrationExecutor, MigrationPlan, MigrationTarget};

use crate::command::ManagementCommand;
use crate::project::{ensure_no_conflicts, Project};

/// Applies or unapplies migrations.
///
/// Supports `--fake` to update the ledger without running SQL, `--plan` to
/// print the plan without executing it, and `--database` to select a
/// database alias.
pub struct MigrateCommand;

/// Resolves the command-line target arguments.
pub fn resolve_targets(
    executor: &MigrationExecutor<'_>,
    app_label: Option<&str>,
    migration_name: Option<&str>,
) -> Result<Vec<MigrationTarget>, MigrationError> {
    let loader = executor.loader();
    let Some(app_label) = app_label else {
        return Ok(executor.latest_targets());
    };
    if !loader.migrated_apps().contains(app_label) {
        return Err(MigraphError::ConfigurationError(format!(
            "App '{app_label}' does not have migrations."
        ))
        .into());
    }
    match migration_name {
        Some("zero") => Ok(vec![MigrationTarget::Zero(app_label.to_string())]),
        Some(prefix) => {
            let migration = loader.get_migration_by_prefix(app_label, prefix)?;
            Ok(vec![MigrationTarget::Node(migration.key())])
        }
        None => Ok(loader
            .graph()
            .leaf_nodes(Some(app_label))
            .into_iter()
            .map(MigrationTarget::Node)
            .collect()),
    }
}

/// Renders a plan, one line per migration followed by its operations.
pub fn describe_plan(executor: &MigrationExecutor<'_>, plan: &MigrationPlan) -> Vec<String> {
    let mut lines = vec!["Planned operations:".to_string()];
    if plan.is_empty() {
        lines.push("  No planned migration operations.".to_string());
        return lines;
    }
    for step in &plan.steps {
        lines.push(format!("{}", step.migration));
        let Ok(migration) = executor.loader().get_migration(&step.migration) else {
            continue;
        };
        if migration.operations.is_empty() {
            lines.push("    (no operations)".to_string());
        }
        for op in &migration.operations {
            if step.backwards {
                lines.push(format!("    Undo {}", op.describe()));
            } else {
                lines.push(format!("    {}", op.describe()));
            }
        }
    }
    lines
}

#[async_trait]
impl ManagementCommand for MigrateCommand {
    fn name(&self) -> &'static str {
        "migrate"
    }

    fn help(&self) -> &'static str {
        "Apply database migrations"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("app_label")
                .help("App label to migrate")
                .required(false),
        )
        .arg(
            clap::Arg::new("migration_name")
                .help("Migration name (prefix) to migrate to, or \"zero\"")
                .required(false),
        )
        .arg(
            clap::Arg::new("fake")
                .long("fake")
                .action(clap::ArgAction::SetTrue)
                .help("Mark migrations as applied without running them"),
        )
        .arg(
            clap::Arg::new("plan")
                .long("plan")
                .action(clap::ArgAction::SetTrue)
                .help("Show the migration plan without executing it"),
        )
        .arg(
            clap::Arg::new("database")
                .long("database")
                .default_value("default")
                .help("Database alias to migrate"),
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
        let fake = matches.get_flag("fake");
        let app_label = matches.get_one::<String>("app_label").map(String::as_str);
        let migration_name = matches
            .get_one::<String>("migration_name")
            .map(String::as_str);

        let project = Project::open(settings, database)?;
        let mut executor = project.executor().await?;
        executor
            .loader()
            .check_consistent_history(&executor.recorder())
            .await?;
        ensure_no_conflicts(executor.loader())?;

        let targets = resolve_targets(&executor, app_label, migration_name)?;

        if matches.get_flag("plan") {
            let plan = executor.migration_plan(&targets, false)?;
            for line in describe_plan(&executor, &plan) {
                println!("{line}");
            }
            return Ok(());
        }

        println!("Operations to perform:");
        for target in &targets {
            println!("  Target: {target}");
        }
        println!("Running migrations:");
        let plan = executor.migrate(&targets, fake).await?;
        if plan.is_empty() {
            println!("  No migrations to apply.");
        }
        for step in &plan.steps {
            let verb = if step.backwards { "Unapplying" } else { "Applying" };
            let suffix = if fake { " FAKED" } else { " OK" };
            println!("  {verb} {}...{suffix}", step.migration);
        }
        Ok(())
    }
}
