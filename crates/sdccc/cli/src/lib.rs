//! SDCcc command line
//!
//! Binds the TOML configuration and the command line onto the core crate,
//! creates the test run directory, installs logging and runs the suite
//! against the simulated device.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod run_dir;

pub use cli::Cli;
pub use config::{ConfigFile, SuiteSettings};
pub use error::{CliError, CliResult};
