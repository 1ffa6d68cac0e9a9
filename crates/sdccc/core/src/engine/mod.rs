//! Test engine
//!
//! Tests are plain descriptors in a catalog. Discovery selects the tests of
//! one phase through a chain of filters; execution runs them one after the
//! other and reports every event to the registered listeners.

mod case;
mod executor;
mod filter;
mod listener;

pub use case::{RunInfo, TestBody, TestCase, TestContext, TestFailure};
pub use executor::{execute, run_case, ExecutionListener, TestOutcome, TestResult};
pub use filter::{
    discover, DescriptionFilter, DiscoveryError, EnabledFilter, EnabledTests, PreconditionFilter,
    TestFilter, TestPlan,
};
pub use listener::{LoggingListener, SummaryListener, TestSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MessageGenerator;
    use crate::observer::RunObserver;
    use crate::precondition::PreconditionRegistry;
    use crate::simulation::{SimulatedDevice, SimulatedDeviceConfig};
    use crate::storage::{InMemoryMessageStorage, MessageStorage, StorageConfig};
    use futures::future::BoxFuture;
    use sdccc_types::{Phase, TestIdentifier};
    use std::sync::Arc;

    fn context() -> TestContext {
        let observer = RunObserver::new();
        let storage: Arc<dyn MessageStorage> = Arc::new(InMemoryMessageStorage::new(
            StorageConfig::default(),
            observer.clone(),
        ));
        let device = Arc::new(SimulatedDevice::new(
            SimulatedDeviceConfig::default(),
            storage.clone(),
        ));
        TestContext {
            client: device.clone(),
            storage,
            generator: MessageGenerator::new(device),
            preconditions: Arc::new(PreconditionRegistry::new(observer.clone())),
            observer,
            run_info: RunInfo::default(),
        }
    }

    fn pass(_ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async { Ok(()) })
    }

    fn assertion(_ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async { Err(TestFailure::Assertion("value mismatch".into())) })
    }

    fn no_data(_ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async { Err(TestFailure::NoTestData("nothing stored".into())) })
    }

    fn aborted(_ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async { Err(TestFailure::Aborted("not applicable".into())) })
    }

    fn errored(_ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async { Err(TestFailure::Error("client gone".into())) })
    }

    fn panics(ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async move {
            if !ctx.observer.is_invalid() {
                panic!("unexpected state");
            }
            Ok(())
        })
    }

    fn case(id: &str, name: &'static str, body: TestBody) -> TestCase {
        TestCase::new(TestIdentifier::parse(id).unwrap(), Phase::Direct, "Suite", name, body)
            .with_description("described")
    }

    #[tokio::test]
    async fn test_outcomes_are_classified() {
        let ctx = context();
        let plan = TestPlan {
            phase: Phase::Direct,
            cases: vec![
                case("T.R1", "pass", pass),
                case("T.R2", "assertion", assertion),
                case("T.R3", "no_data", no_data),
                case("T.R4", "aborted", aborted),
                case("T.R5", "errored", errored),
                case("T.R6", "panics", panics),
            ],
        };
        let mut summary = SummaryListener::new();
        let mut logging = LoggingListener;

        let mut listeners: [&mut dyn ExecutionListener; 2] = [&mut summary, &mut logging];
        let results = execute(&plan, &ctx, &mut listeners).await;

        assert_eq!(results[0].outcome, TestOutcome::Passed);
        assert!(matches!(results[1].outcome, TestOutcome::Failed(TestFailure::Assertion(_))));
        assert!(matches!(results[2].outcome, TestOutcome::Failed(TestFailure::NoTestData(_))));
        assert_eq!(results[3].outcome, TestOutcome::Aborted("not applicable".into()));
        assert!(matches!(results[4].outcome, TestOutcome::Errored { ref type_name, .. } if type_name == "Error"));
        assert_eq!(
            results[5].outcome,
            TestOutcome::Errored {
                type_name: "Panic".into(),
                message: "unexpected state".into()
            }
        );

        let summary = summary.into_summary();
        assert_eq!(summary.tests_found, 6);
        assert_eq!(summary.tests_started, 6);
        assert_eq!(summary.tests_succeeded, 1);
        assert_eq!(summary.tests_aborted, 1);
        assert_eq!(summary.total_failure_count(), 4);
        assert_eq!(summary.failures[0].0, "[class:Suite]/[method:assertion()]");
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let ctx = context();
        let plan = TestPlan {
            phase: Phase::Invariant,
            cases: vec![],
        };
        let mut summary = SummaryListener::new();
        let mut listeners: [&mut dyn ExecutionListener; 1] = [&mut summary];
        let results = execute(&plan, &ctx, &mut listeners).await;
        assert!(results.is_empty());
        assert_eq!(summary.summary(), &TestSummary::default());
    }
}
