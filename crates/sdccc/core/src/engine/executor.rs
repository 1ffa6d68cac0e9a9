//! Sequential test execution

use super::case::{TestCase, TestContext, TestFailure};
use super::filter::TestPlan;
use futures::FutureExt;
use sdccc_types::{Phase, TestIdentifier};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Classified result of one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// Assertion failure or missing test data
    Failed(TestFailure),
    /// Unexpected error or panic
    Errored { type_name: String, message: String },
    /// Test does not apply
    Aborted(String),
}

impl TestOutcome {
    fn from_result(result: Result<(), TestFailure>) -> Self {
        match result {
            Ok(()) => TestOutcome::Passed,
            Err(failure @ (TestFailure::Assertion(_) | TestFailure::NoTestData(_))) => {
                TestOutcome::Failed(failure)
            }
            Err(TestFailure::Aborted(reason)) => TestOutcome::Aborted(reason),
            Err(failure @ TestFailure::Error(_)) => TestOutcome::Errored {
                type_name: failure.type_name().to_string(),
                message: failure.to_string(),
            },
        }
    }

    /// Whether the outcome counts toward the failure total
    pub fn is_failure(&self) -> bool {
        matches!(self, TestOutcome::Failed(_) | TestOutcome::Errored { .. })
    }
}

/// Result of one executed test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub identifier: TestIdentifier,
    pub phase: Phase,
    pub class_name: String,
    pub name: String,
    pub description: String,
    pub unique_id: String,
    pub outcome: TestOutcome,
    pub duration: Duration,
}

/// Receives execution events
///
/// All methods default to doing nothing.
pub trait ExecutionListener: Send {
    fn plan_started(&mut self, _plan: &TestPlan) {}

    fn test_started(&mut self, _case: &TestCase) {}

    fn test_finished(&mut self, _case: &TestCase, _result: &TestResult) {}

    fn plan_finished(&mut self, _plan: &TestPlan) {}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_string()
    }
}

/// Run one test, catching panics
pub async fn run_case(case: &TestCase, ctx: &TestContext) -> TestResult {
    let start = Instant::now();
    let outcome = match AssertUnwindSafe((case.body)(ctx)).catch_unwind().await {
        Ok(result) => TestOutcome::from_result(result),
        Err(payload) => TestOutcome::Errored {
            type_name: "Panic".to_string(),
            message: panic_message(payload.as_ref()),
        },
    };
    TestResult {
        identifier: case.identifier.clone(),
        phase: case.phase,
        class_name: case.class_name.to_string(),
        name: case.name.to_string(),
        description: case.description.unwrap_or_default().to_string(),
        unique_id: case.unique_id(),
        outcome,
        duration: start.elapsed(),
    }
}

/// Execute every test of the plan in order, notifying all listeners
pub async fn execute(
    plan: &TestPlan,
    ctx: &TestContext,
    listeners: &mut [&mut dyn ExecutionListener],
) -> Vec<TestResult> {
    for listener in listeners.iter_mut() {
        listener.plan_started(plan);
    }

    let mut results = Vec::with_capacity(plan.len());
    for case in &plan.cases {
        for listener in listeners.iter_mut() {
            listener.test_started(case);
        }
        let result = run_case(case, ctx).await;
        for listener in listeners.iter_mut() {
            listener.test_finished(case, &result);
        }
        results.push(result);
    }

    for listener in listeners.iter_mut() {
        listener.plan_finished(plan);
    }
    results
}
