pub mod config;
pub mod error;

pub use config::{Settings, ValidationResult};
pub use error::{ConfigError, DatabaseError, RusqliteErrorExt, ValidationError};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of the daily-rolled log file.
const LOG_FILE: &str = "app.log";

/// Initialize tracing/logging.
///
/// Logs go to stdout and to a daily-rolled file under `log_dir`. The
/// returned guard flushes the file writer and must live as long as the
/// process. If the directory cannot be created, logging continues on
/// stdout only.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
            Some(tracing_appender::non_blocking(appender))
        }
        Err(e) => {
            eprintln!(
                "Could not create log directory {}: {}. Continuing with console logging only.",
                log_dir.display(),
                e
            );
            None
        }
    };

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        ),
        None => (None, None),
    };

    let init = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    if let Err(e) = init {
        eprintln!("Logging already initialized: {}", e);
    }

    tracing::info!("wxproxy logging initialized");
    guard
}
