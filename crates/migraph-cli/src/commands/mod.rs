//! Built-in management commands.
//!
//! Each command implements the
//! [`ManagementCommand`](crate::command::ManagementCommand) trait.

pub mod checkmigrations;
pub mod migrate;
pub mod showmigrations;

pub use checkmigrations::CheckmigrationsCommand;
pub use migrate::MigrateCommand;
pub use showmigrations::ShowmigrationsCommand;

use crate::command::CommandRegistry;

/// Registers all built-in management commands into the given registry.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(MigrateCommand));
    registry.register(Box::new(ShowmigrationsCommand));
    registry.register(Box::new(CheckmigrationsCommand));
}
