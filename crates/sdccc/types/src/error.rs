//! Error types for sdccc-types

use thiserror::Error;

/// Errors raised while building shared values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// Identifier did not have the `STANDARD.REQUIREMENT` shape
    #[error("Invalid test identifier: {0}")]
    InvalidIdentifier(String),

    /// Unknown phase name
    #[error("Unknown test phase: {0}")]
    UnknownPhase(String),
}

/// Result type alias for shared type construction
pub type TypesResult<T> = Result<T, TypesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::InvalidIdentifier("R0001".into());
        assert!(err.to_string().contains("R0001"));

        let err = TypesError::UnknownPhase("later".into());
        assert_eq!(err.to_string(), "Unknown test phase: later");
    }
}
