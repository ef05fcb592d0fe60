//! Tracing setup driven by the `logging_config` section.

use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Initialize the global tracing subscriber.
///
/// The configured level acts as the default filter; `RUST_LOG` still wins
/// when set. Returns a guard that must stay alive for the duration of the
/// run when logging to a file. An unusable log file path is a fatal
/// configuration error, not a panic.
pub fn init(
    config: &LoggingConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.file {
        Some(path) => {
            prepare_log_file(path)?;
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| "mail-bouncer.log".as_ref());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            Ok(None)
        }
    }
}

/// Create the log file's directory and verify the file is writable, so
/// the appender cannot panic on a syntactically valid config.
fn prepare_log_file(path: &Path) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "logging_config.file".to_string(),
        message,
    };

    if let Some(directory) = path.parent() {
        if !directory.as_os_str().is_empty() {
            std::fs::create_dir_all(directory)
                .map_err(|e| invalid(format!("cannot create {}: {e}", directory.display())))?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| invalid(format!("cannot open {}: {e}", path.display())))?;
    Ok(())
}
