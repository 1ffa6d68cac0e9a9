//! Requirement identifiers and test phases

use crate::error::{TypesError, TypesResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution phase a test belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Interacts with the live connection while running
    Direct,
    /// Inspects stored messages only, after disconnect
    Invariant,
}

impl Phase {
    /// Suffix used for report file names (`TEST-SDCcc_<suffix>.xml`)
    pub fn report_suffix(&self) -> &'static str {
        match self {
            Phase::Direct => "direct",
            Phase::Invariant => "invariant",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.report_suffix())
    }
}

impl FromStr for Phase {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Phase::Direct),
            "invariant" => Ok(Phase::Invariant),
            other => Err(TypesError::UnknownPhase(other.to_string())),
        }
    }
}

/// Stable requirement identifier such as `BICEPS.R0021`
///
/// The part before the first dot names the standard, the rest names the
/// requirement within it. Identifiers key the enabled-test configuration
/// and the report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestIdentifier(String);

impl TestIdentifier {
    /// Parse an identifier, rejecting anything without a standard and a requirement part
    pub fn parse(value: impl Into<String>) -> TypesResult<Self> {
        let value = value.into();
        match value.split_once('.') {
            Some((standard, requirement))
                if !standard.is_empty()
                    && !requirement.is_empty()
                    && !value.chars().any(char::is_whitespace) =>
            {
                Ok(Self(value))
            }
            _ => Err(TypesError::InvalidIdentifier(value)),
        }
    }

    /// Build an identifier from its two parts
    pub fn from_parts(standard: &str, requirement: &str) -> TypesResult<Self> {
        Self::parse(format!("{}.{}", standard, requirement))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Standard part, e.g. `BICEPS`
    pub fn standard(&self) -> &str {
        self.0.split_once('.').map(|(s, _)| s).unwrap_or(&self.0)
    }

    /// Requirement part, e.g. `R0021`
    pub fn requirement(&self) -> &str {
        self.0.split_once('.').map(|(_, r)| r).unwrap_or("")
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TestIdentifier {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TestIdentifier> for String {
    fn from(id: TestIdentifier) -> Self {
        id.0
    }
}

impl FromStr for TestIdentifier {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identifier_parts() {
        let id = TestIdentifier::parse("BICEPS.R0021").unwrap();
        assert_eq!(id.standard(), "BICEPS");
        assert_eq!(id.requirement(), "R0021");
        assert_eq!(id.to_string(), "BICEPS.R0021");

        let nested = TestIdentifier::parse("BICEPS.5-4-7_0_0").unwrap();
        assert_eq!(nested.requirement(), "5-4-7_0_0");
    }

    #[test]
    fn test_identifier_rejects_malformed() {
        assert!(TestIdentifier::parse("R0021").is_err());
        assert!(TestIdentifier::parse(".R0021").is_err());
        assert!(TestIdentifier::parse("BICEPS.").is_err());
        assert!(TestIdentifier::parse("BICEPS. R0021").is_err());
    }

    #[test]
    fn test_identifier_serde_validates() {
        let id: TestIdentifier = serde_json::from_str("\"DPWS.R0019\"").unwrap();
        assert_eq!(id.standard(), "DPWS");
        assert!(serde_json::from_str::<TestIdentifier>("\"DPWS\"").is_err());
    }

    #[test]
    fn test_phase_parse_and_suffix() {
        assert_eq!("Direct".parse::<Phase>().unwrap(), Phase::Direct);
        assert_eq!(Phase::Invariant.report_suffix(), "invariant");
        assert!("phase3".parse::<Phase>().is_err());
    }

    proptest! {
        #[test]
        fn test_from_parts_round_trips(std in "[A-Z]{2,8}", req in "R[0-9]{4}") {
            let id = TestIdentifier::from_parts(&std, &req).unwrap();
            prop_assert_eq!(id.standard(), std.as_str());
            prop_assert_eq!(id.requirement(), req.as_str());
        }
    }
}
