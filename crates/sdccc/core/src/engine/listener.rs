//! Built-in execution listeners

use super::case::TestCase;
use super::executor::{ExecutionListener, TestOutcome, TestResult};
use super::filter::TestPlan;
use tracing::{info, warn};

/// Counts of one executed plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub tests_found: u64,
    pub tests_started: u64,
    pub tests_succeeded: u64,
    /// Failures and errors
    pub tests_failed: u64,
    pub tests_aborted: u64,
    /// Unique id and message of every failed test
    pub failures: Vec<(String, String)>,
}

impl TestSummary {
    pub fn total_failure_count(&self) -> u64 {
        self.tests_failed
    }
}

/// Aggregates a [`TestSummary`]
#[derive(Debug, Default)]
pub struct SummaryListener {
    summary: TestSummary,
}

impl SummaryListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> &TestSummary {
        &self.summary
    }

    pub fn into_summary(self) -> TestSummary {
        self.summary
    }
}

impl ExecutionListener for SummaryListener {
    fn plan_started(&mut self, plan: &TestPlan) {
        self.summary.tests_found += plan.len() as u64;
    }

    fn test_started(&mut self, _case: &TestCase) {
        self.summary.tests_started += 1;
    }

    fn test_finished(&mut self, _case: &TestCase, result: &TestResult) {
        match &result.outcome {
            TestOutcome::Passed => self.summary.tests_succeeded += 1,
            TestOutcome::Aborted(_) => self.summary.tests_aborted += 1,
            TestOutcome::Failed(failure) => {
                self.summary.tests_failed += 1;
                self.summary
                    .failures
                    .push((result.unique_id.clone(), failure.to_string()));
            }
            TestOutcome::Errored { message, .. } => {
                self.summary.tests_failed += 1;
                self.summary
                    .failures
                    .push((result.unique_id.clone(), message.clone()));
            }
        }
    }
}

/// Logs each test as it starts and finishes
#[derive(Debug, Default)]
pub struct LoggingListener;

impl ExecutionListener for LoggingListener {
    fn plan_started(&mut self, plan: &TestPlan) {
        info!(phase = %plan.phase, tests = plan.len(), "Starting test plan");
    }

    fn test_started(&mut self, case: &TestCase) {
        info!(test = %case.identifier, "Starting test {}", case.unique_id());
    }

    fn test_finished(&mut self, _case: &TestCase, result: &TestResult) {
        match &result.outcome {
            TestOutcome::Passed => {
                info!(test = %result.identifier, duration = ?result.duration, "Test {} passed", result.unique_id)
            }
            TestOutcome::Aborted(reason) => {
                info!(test = %result.identifier, %reason, "Test {} was aborted", result.unique_id)
            }
            TestOutcome::Failed(failure) => {
                warn!(test = %result.identifier, %failure, "Test {} failed", result.unique_id)
            }
            TestOutcome::Errored { message, .. } => {
                warn!(test = %result.identifier, %message, "Test {} ended with an error", result.unique_id)
            }
        }
    }

    fn plan_finished(&mut self, plan: &TestPlan) {
        info!(phase = %plan.phase, "Test plan finished");
    }
}
