use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use mail_bouncer::config::GlobalConfig;
use mail_bouncer::logging;
use mail_bouncer::runner::Runner;
use mail_bouncer::source::{GmailSource, MessageSource};

#[tokio::main]
async fn main() -> ExitCode {
    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("Usage: mail-bouncer <config.json>");
        return ExitCode::FAILURE;
    };

    // Setup failures are fatal and exit non-zero. A completed run exits 0
    // even with recorded per-message failures, so the scheduler does not
    // alert on transient issues.
    let config = match GlobalConfig::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(path = %config_path, "configuration loaded");

    let source = match GmailSource::connect(&config).await {
        Ok(source) => Arc::new(source) as Arc<dyn MessageSource>,
        Err(e) => {
            tracing::error!("Failed to connect to mail store: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Runner::new(config, source).run().await {
        Ok(summary) => {
            if summary.error_count() > 0 {
                tracing::warn!(
                    errors = summary.error_count(),
                    "run completed with recorded failures; they retry next run"
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Run aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
