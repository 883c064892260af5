//! Logging integration.
//!
//! Configures the global [`tracing`] subscriber from [`Settings`] and provides
//! the span used around migration runs.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug", or
/// "migraph_migrations=trace,info"). In debug mode a pretty, human-readable
/// format is used; otherwise a structured JSON format is used. Installing a
/// second subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for a migration run against one database alias.
///
/// # Examples
///
/// ```
/// use migraph_core::logging::migrate_span;
///
/// let span = migrate_span("default");
/// let _guard = span.enter();
/// tracing::info!("applying migrations");
/// ```
pub fn migrate_span(database: &str) -> tracing::Span {
    tracing::info_span!("migrate", database = database)
}
