//! Test run directory

use crate::error::{CliError, CliResult};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const RUN_DIR_PREFIX: &str = "SDCcc_Testrun_";

/// Base used when no directory is given on the command line
pub const DEFAULT_BASE_DIR: &str = "testruns";

/// Folder name for a run started at `started`
///
/// `:` is not allowed in file names on every platform.
pub fn dir_name(started: DateTime<Local>) -> String {
    format!(
        "{}{}",
        RUN_DIR_PREFIX,
        started.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string().replace(':', "-")
    )
}

/// Create the folder of this run below `base`
pub fn create(base: Option<&Path>) -> CliResult<PathBuf> {
    let base = base.unwrap_or_else(|| Path::new(DEFAULT_BASE_DIR));
    let dir = base.join(dir_name(Local::now()));
    std::fs::create_dir_all(&dir).map_err(|source| CliError::io(&dir, source))?;
    Ok(dir)
}
