//! The `migraph` management binary.

use std::process::ExitCode;

use migraph_cli::commands::register_builtin_commands;
use migraph_cli::CommandRegistry;
use migraph_core::logging::setup_logging;
use migraph_core::settings_loader;

#[tokio::main]
async fn main() -> ExitCode {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    let matches = registry.build_cli().get_matches();

    let settings = match matches.get_one::<String>("settings") {
        Some(path) => match settings_loader::from_file_with_env(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("migraph: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => settings_loader::from_env(),
    };
    setup_logging(&settings);
    tracing::debug!(apps = ?settings.installed_apps, "settings loaded");

    match registry.execute(&matches, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("migraph: {e}");
            ExitCode::FAILURE
        }
    }
}
