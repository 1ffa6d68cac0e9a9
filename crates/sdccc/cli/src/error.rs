//! CLI error types

use sdccc_core::SuiteError;
use sdccc_types::TypesError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File could not be read or written
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Could not parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Test configuration names an invalid identifier
    #[error("Invalid test identifier: {0}")]
    Identifier(#[from] TypesError),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Fatal orchestrator error
    #[error(transparent)]
    Suite(#[from] SuiteError),
}

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
