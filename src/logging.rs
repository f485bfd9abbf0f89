use std::env;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::LOG_FILENAME;

/// Environment variable that overrides the default `info` filter
pub const LOG_FILTER_ENV: &str = "TEAM_BANNERS_LOG";

/// Start the activity log under `base_dir`.
///
/// Returns `None` when logging is disabled; the console keeps its plain
/// colored output either way. The guard must live until shutdown, and must be
/// dropped before the base directory is deleted.
pub fn init_logging(base_dir: &Path, enabled: bool) -> Option<WorkerGuard> {
    if !enabled || !base_dir.is_dir() {
        return None;
    }

    let filter = env::var(LOG_FILTER_ENV).unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::never(base_dir, LOG_FILENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(false)
                .with_ansi(false),
        )
        .with(filter_layer)
        .try_init();

    if installed.is_err() {
        // Another subscriber is already active (tests, repeated init)
        return None;
    }

    info!("===== team_banners v{} started =====", crate::VERSION);
    Some(guard)
}

/// Flush and close the activity log.
pub fn shutdown_logging(guard: Option<WorkerGuard>) {
    if guard.is_some() {
        info!("===== team_banners finished =====");
    }
    drop(guard);
}
