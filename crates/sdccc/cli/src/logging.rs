//! Tracing initialisation
//!
//! Console output is filtered by `RUST_LOG` (default `info`). The log file
//! in the test run directory has its own level. The error-trigger layer sees
//! every event regardless of either filter.

use crate::error::{CliError, CliResult};
use sdccc_core::{ErrorTriggerLayer, RunObserver};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "log.txt";

fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Parse the level of the log file
pub fn file_filter(level: &str) -> CliResult<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| CliError::Config(format!("Invalid file log level {:?}: {}", level, e)))
}

/// Install the global subscriber for this process
pub fn init(run_dir: &Path, file_level: &str, json: bool, observer: RunObserver) -> CliResult<()> {
    let path = run_dir.join(LOG_FILE_NAME);
    let file = File::create(&path).map_err(|source| CliError::io(&path, source))?;

    let console = if json {
        fmt::layer().json().with_filter(console_filter()).boxed()
    } else {
        fmt::layer().with_filter(console_filter()).boxed()
    };
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(Mutex::new(file))
        .with_filter(file_filter(file_level)?);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(ErrorTriggerLayer::new(observer))
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_filter_levels() {
        assert!(file_filter("debug").is_ok());
        assert!(file_filter("sdccc_core=trace,info").is_ok());
        assert!(matches!(file_filter("sdccc=loud"), Err(CliError::Config(_))));
    }
}
