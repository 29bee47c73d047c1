//! Usage: Process-wide tracing setup (stdout + optional daily log file, `log` crate bridged in).

use crate::shared::error::AppResult;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "github-pkce-relay.log";

/// Installs the global subscriber. Keep the returned guard alive until exit or buffered
/// file output is lost.
pub fn init(log_dir: Option<&Path>) -> AppResult<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                format!("SYSTEM_ERROR: failed to create log dir {}: {e}", dir.display())
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("SYSTEM_ERROR: failed to install tracing subscriber: {e}"))?;
    tracing_log::LogTracer::init()
        .map_err(|e| format!("SYSTEM_ERROR: failed to bridge log records: {e}"))?;

    if let Some(dir) = log_dir {
        tracing::info!(log_dir = %dir.display(), "file logging enabled");
    }
    Ok(guard)
}

#[cfg(test)]
pub(crate) fn setup_test_logging() {
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_test_writer(),
        )
        .with(EnvFilter::new("debug,hyper=info,reqwest=info"))
        .try_init();
}
