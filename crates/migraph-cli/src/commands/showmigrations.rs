//! The `showmigrations` management command.
//!
//! Displays the status of migrations, either per app or as the flat plan
//! `migrate` would follow.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use migraph_core::{MigraphError, Settings};
use migraph_migrations::{MigrationError, MigrationKey, MigrationLoader, MigrationRecord};

use crate::command::ManagementCommand;
use crate::project::Project;

/// Lists migrations and their applied/unapplied status.
///
/// `[X]` marks a recorded migration, `[-]` a squash whose replaced
/// migrations are all recorded but which is not recorded itself.
pub struct ShowmigrationsCommand;

/// Renders the per-app listing.
pub fn render_list(
    loader: &MigrationLoader,
    recorded: &BTreeMap<MigrationKey, MigrationRecord>,
    app_labels: &[String],
) -> Vec<String> {
    let graph = loader.graph();
    let mut lines = Vec::new();
    for app_label in app_labels {
        lines.push(app_label.clone());
        let mut shown: BTreeSet<MigrationKey> = BTreeSet::new();
        for leaf in graph.leaf_nodes(Some(app_label)) {
            let Ok(plan) = graph.forwards_plan(&leaf) else {
                continue;
            };
            for key in plan {
                if key.app_label != *app_label || shown.contains(&key) {
                    continue;
                }
                let mut title = key.name.clone();
                if let Some(migration) = graph.node(&key) {
                    if migration.is_squash() {
                        title.push_str(&format!(
                            " ({} squashed migrations)",
                            migration.replaces.len()
                        ));
                    }
                }
                let line = if loader.session().is_applied(&key) {
                    match recorded.get(&key) {
                        Some(record) => format!(
                            " [X] {title} (applied at {})",
                            record.applied.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => format!(" [-] {title}"),
                    }
                } else {
                    format!(" [ ] {title}")
                };
                lines.push(line);
                shown.insert(key);
            }
        }
        if shown.is_empty() {
            lines.push(" (no migrations)".to_string());
        }
    }
    lines
}

/// Renders every migration in apply order, restricted to `app_labels`'
/// leaves when given.
pub fn render_plan(loader: &MigrationLoader, app_labels: &[String]) -> Vec<String> {
    let graph = loader.graph();
    let targets: Vec<MigrationKey> = if app_labels.is_empty() {
        graph.leaf_nodes(None)
    } else {
        app_labels
            .iter()
            .flat_map(|app| graph.leaf_nodes(Some(app)))
            .collect()
    };
    let mut seen: BTreeSet<MigrationKey> = BTreeSet::new();
    let mut lines = Vec::new();
    for target in targets {
        let Ok(plan) = graph.forwards_plan(&target) else {
            continue;
        };
        for key in plan {
            if !seen.insert(key.clone()) {
                continue;
            }
            let mark = if loader.session().is_applied(&key) { "X" } else { " " };
            lines.push(format!("[{mark}]  {key}"));
        }
    }
    if lines.is_empty() {
        lines.push("(no migrations)".to_string());
    }
    lines
}

#[async_trait]
impl ManagementCommand for ShowmigrationsCommand {
    fn name(&self) -> &'static str {
        "showmigrations"
    }

    fn help(&self) -> &'static str {
        "Show migration status"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("app_label")
                .help("App label(s) to show migrations for")
                .num_args(0..)
                .required(false),
        )
        .arg(
            clap::Arg::new("database")
                .long("database")
                .default_value("default")
                .help("Database alias to check"),
        )
        .arg(
            clap::Arg::new("plan")
                .long("plan")
                .action(clap::ArgAction::SetTrue)
                .help("Show planned migration order"),
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
        let requested: Vec<String> = matches
            .get_many::<String>("app_label")
            .map(|apps| apps.cloned().collect())
            .unwrap_or_default();

        let project = Project::open(settings, database)?;
        let loader = project.built_loader().await?;

        for app in &requested {
            if !loader.migrated_apps().contains(app) {
                return Err(MigraphError::ConfigurationError(format!(
                    "App '{app}' does not have migrations."
                ))
                .into());
            }
        }

        let lines = if matches.get_flag("plan") {
            render_plan(&loader, &requested)
        } else {
            let recorded = project.recorder().applied_migrations().await?;
            let apps: Vec<String> = if requested.is_empty() {
                loader.migrated_apps().iter().cloned().collect()
            } else {
                requested
            };
            render_list(&loader, &recorded, &apps)
        };
        for line in lines {
            println!("{line}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use migraph_core::AppRegistry;
    use migraph_migrations::{Migration, StaticSource};

    use super::*;

    fn built(recorded: &[(&str, &str)]) -> (MigrationLoader, BTreeMap<MigrationKey, MigrationRecord>) {
        let source = StaticSource::new()
            .with_migration("blog.migrations", Migration::new("", "0001_initial"))
            .with_migration(
                "blog.migrations",
                Migration::new("", "0002_tags").depends_on("blog", "0001_initial"),
            )
            .with_migration(
                "blog.migrations",
                Migration::new("", "0001_squashed_0002")
                    .replaces("blog", "0001_initial")
                    .replaces("blog", "0002_tags"),
            )
            .with_migration(
                "shop.migrations",
                Migration::new("", "0001_initial").depends_on("blog", "__first__"),
            );
        let registry = AppRegistry::from_installed_apps(&["blog", "shop"]).unwrap();
        let mut loader = MigrationLoader::new(Arc::new(registry), Arc::new(source));
        let records: Vec<MigrationRecord> = recorded
            .iter()
            .map(|(app, name)| MigrationRecord::new(*app, *name))
            .collect();
        loader.build_graph_with_applied(records.clone()).unwrap();
        let recorded = records.into_iter().map(|r| (r.key(), r)).collect();
        (loader, recorded)
    }

    #[test]
    fn test_render_list() {
        let (loader, recorded) =
            built(&[("blog", "0001_initial"), ("blog", "0002_tags")]);
        let lines = render_list(&loader, &recorded, &["blog".into(), "shop".into()]);
        assert_eq!(lines[0], "blog");
        assert_eq!(lines[1], " [-] 0001_squashed_0002 (2 squashed migrations)");
        assert_eq!(lines[2], "shop");
        assert_eq!(lines[3], " [ ] 0001_initial");

        let (loader, recorded) = built(&[
            ("blog", "0001_initial"),
            ("blog", "0002_tags"),
            ("blog", "0001_squashed_0002"),
        ]);
        let lines = render_list(&loader, &recorded, &["blog".into()]);
        assert!(lines[1].starts_with(" [X] 0001_squashed_0002 (2 squashed migrations) (applied at "));
    }

    #[test]
    fn test_render_list_unapplied() {
        let (loader, recorded) = built(&[]);
        let lines = render_list(&loader, &recorded, &["blog".into()]);
        assert_eq!(lines, vec!["blog", " [ ] 0001_squashed_0002 (2 squashed migrations)"]);
    }

    #[test]
    fn test_render_plan() {
        let (loader, _) = built(&[("blog", "0001_initial"), ("blog", "0002_tags")]);
        assert_eq!(
            render_plan(&loader, &[]),
            vec!["[X]  blog.0001_squashed_0002", "[ ]  shop.0001_initial"]
        );
        assert_eq!(
            render_plan(&loader, &["blog".into()]),
            vec!["[X]  blog.0001_squashed_0002"]
        );
    }
}
