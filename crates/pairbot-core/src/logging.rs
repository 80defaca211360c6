//! Diagnostic logging for pairbot
//!
//! stdout belongs to the NDJSON event stream, so diagnostics only ever go to
//! a daily file under `<data dir>/pairbot/logs/`. The worker's own output is
//! kept separately in [`WORKER_OUTPUT_LOG`] next to it.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "PAIRBOT_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid
pub const DEFAULT_FILTER: &str = "pairbot=info,warn";

/// File name prefix of the diagnostic log; the appender adds the date
const DIAGNOSTIC_LOG_PREFIX: &str = "pairbot.log";

/// File name of the worker output log inside the log directory
pub const WORKER_OUTPUT_LOG: &str = "worker-output.log";

/// Install the global subscriber. Call once, before the engine starts.
///
/// ```bash
/// PAIRBOT_LOG=debug pairbot --start
/// PAIRBOT_LOG=pairbot_worker=trace,pairbot_app=debug pairbot
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let diagnostics = RollingFileAppender::new(Rotation::DAILY, &log_dir, DIAGNOSTIC_LOG_PREFIX);

    tracing_subscriber::registry()
        .with(filter_from_env())
        .with(
            fmt::layer()
                .with_writer(diagnostics)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir = %log_dir.display(),
        "pairbot diagnostics enabled"
    );
    Ok(())
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Directory holding both the diagnostic log and the worker output log
pub fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("pairbot").join("logs"))
}

/// Path of the durable worker output log
pub fn get_worker_output_log() -> Result<PathBuf> {
    Ok(get_log_directory()?.join(WORKER_OUTPUT_LOG))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_output_log_lives_in_log_directory() {
        let dir = get_log_directory().unwrap();
        let file = get_worker_output_log().unwrap();
        assert_eq!(file.parent(), Some(dir.as_path()));
        assert!(dir.ends_with("pairbot/logs"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
