//! Device changes observed while connected

use crate::soap::action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of report a device change is delivered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportKind {
    Metric,
    Alert,
    Component,
    Context,
    Operation,
    Description,
    Waveform,
}

impl ReportKind {
    pub const ALL: [ReportKind; 7] = [
        ReportKind::Metric,
        ReportKind::Alert,
        ReportKind::Component,
        ReportKind::Context,
        ReportKind::Operation,
        ReportKind::Description,
        ReportKind::Waveform,
    ];

    /// Action URI of the report carrying this kind of change
    pub fn report_action(&self) -> &'static str {
        match self {
            ReportKind::Metric => action::EPISODIC_METRIC_REPORT,
            ReportKind::Alert => action::EPISODIC_ALERT_REPORT,
            ReportKind::Component => action::EPISODIC_COMPONENT_REPORT,
            ReportKind::Context => action::EPISODIC_CONTEXT_REPORT,
            ReportKind::Operation => action::EPISODIC_OPERATIONAL_STATE_REPORT,
            ReportKind::Description => action::DESCRIPTION_MODIFICATION_REPORT,
            ReportKind::Waveform => action::WAVEFORM_STREAM,
        }
    }

    /// Local element name of the report body
    pub fn report_element(&self) -> &'static str {
        self.report_action()
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// A change of the DUT's MDIB as seen by the connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceChange {
    pub kind: ReportKind,
    pub handles: Vec<String>,
    pub mdib_version: u64,
    pub observed_at: DateTime<Utc>,
}

impl DeviceChange {
    pub fn new(kind: ReportKind, handles: Vec<String>, mdib_version: u64) -> Self {
        Self {
            kind,
            handles,
            mdib_version,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_element_names() {
        assert_eq!(ReportKind::Metric.report_element(), "EpisodicMetricReport");
        assert_eq!(
            ReportKind::Description.report_element(),
            "DescriptionModificationReport"
        );
        assert_eq!(ReportKind::Waveform.report_element(), "WaveformStream");
    }

    #[test]
    fn test_all_kinds_have_distinct_actions() {
        let mut actions: Vec<_> = ReportKind::ALL.iter().map(|k| k.report_action()).collect();
        actions.sort();
        actions.dedup();
        assert_eq!(actions.len(), ReportKind::ALL.len());
    }
}
