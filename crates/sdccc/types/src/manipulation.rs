//! Manipulation outcomes and records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outcome reported by a manipulation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManipulationResult {
    Success,
    Fail,
    NotSupported,
    NotImplemented,
}

impl ManipulationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ManipulationResult::Success)
    }
}

impl fmt::Display for ManipulationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ManipulationResult::Success => "RESULT_SUCCESS",
            ManipulationResult::Fail => "RESULT_FAIL",
            ManipulationResult::NotSupported => "RESULT_NOT_SUPPORTED",
            ManipulationResult::NotImplemented => "RESULT_NOT_IMPLEMENTED",
        };
        f.write_str(text)
    }
}

/// Stored record of one executed manipulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManipulationInfo {
    pub id: Uuid,
    pub method_name: String,
    pub parameters: Vec<(String, String)>,
    pub result: ManipulationResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ManipulationInfo {
    pub fn new(
        method_name: impl Into<String>,
        parameters: Vec<(String, String)>,
        result: ManipulationResult,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            method_name: method_name.into(),
            parameters,
            result,
            started_at,
            finished_at,
        }
    }

    /// Value of a named parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_display_and_success() {
        assert!(ManipulationResult::Success.is_success());
        assert!(!ManipulationResult::NotSupported.is_success());
        assert_eq!(ManipulationResult::Fail.to_string(), "RESULT_FAIL");
    }

    #[test]
    fn test_info_parameter_lookup() {
        let now = Utc::now();
        let info = ManipulationInfo::new(
            "trigger_report",
            vec![("kind".into(), "Metric".into())],
            ManipulationResult::Success,
            now,
            now,
        );
        assert_eq!(info.parameter("kind"), Some("Metric"));
        assert_eq!(info.parameter("handle"), None);
    }
}
