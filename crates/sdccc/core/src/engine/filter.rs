//! Test discovery filters

use super::case::TestCase;
use crate::precondition::{PreconditionError, PreconditionRegistry};
use sdccc_types::{Phase, TestIdentifier};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors that stop discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Could not register preconditions of test {test}")]
    Precondition {
        test: TestIdentifier,
        #[source]
        source: PreconditionError,
    },
}

/// Enabled-test configuration, identifier to flag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledTests {
    tests: BTreeMap<TestIdentifier, bool>,
}

impl EnabledTests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, identifier: TestIdentifier, enabled: bool) {
        self.tests.insert(identifier, enabled);
    }

    /// Unknown identifiers are disabled
    pub fn is_enabled(&self, identifier: &TestIdentifier) -> bool {
        self.tests.get(identifier).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl FromIterator<(TestIdentifier, bool)> for EnabledTests {
    fn from_iter<I: IntoIterator<Item = (TestIdentifier, bool)>>(iter: I) -> Self {
        Self {
            tests: iter.into_iter().collect(),
        }
    }
}

/// Decides whether a test takes part in the run
pub trait TestFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn include(&self, case: &TestCase) -> Result<bool, DiscoveryError>;
}

/// Keeps tests enabled in the test configuration
pub struct EnabledFilter {
    enabled: EnabledTests,
}

impl EnabledFilter {
    pub fn new(enabled: EnabledTests) -> Self {
        Self { enabled }
    }
}

impl TestFilter for EnabledFilter {
    fn name(&self) -> &'static str {
        "enabled"
    }

    fn include(&self, case: &TestCase) -> Result<bool, DiscoveryError> {
        Ok(self.enabled.is_enabled(&case.identifier))
    }
}

/// Rejects tests without a description
pub struct DescriptionFilter;

impl TestFilter for DescriptionFilter {
    fn name(&self) -> &'static str {
        "description"
    }

    fn include(&self, case: &TestCase) -> Result<bool, DiscoveryError> {
        match case.description {
            Some(description) if !description.trim().is_empty() => Ok(true),
            _ => {
                error!(test = %case.identifier, "Test {} is missing a description", case.unique_id());
                Ok(false)
            }
        }
    }
}

/// Registers the preconditions of invariant tests
pub struct PreconditionFilter {
    registry: Arc<PreconditionRegistry>,
}

impl PreconditionFilter {
    pub fn new(registry: Arc<PreconditionRegistry>) -> Self {
        Self { registry }
    }
}

impl TestFilter for PreconditionFilter {
    fn name(&self) -> &'static str {
        "precondition"
    }

    fn include(&self, case: &TestCase) -> Result<bool, DiscoveryError> {
        if case.phase != Phase::Invariant {
            return Ok(true);
        }
        for spec in &case.preconditions {
            self.registry
                .register(spec)
                .map_err(|source| DiscoveryError::Precondition {
                    test: case.identifier.clone(),
                    source,
                })?;
        }
        Ok(true)
    }
}

/// Tests selected for one phase, in catalog order
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub phase: Phase,
    pub cases: Vec<TestCase>,
}

impl TestPlan {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Select the tests of `phase` passing every filter
///
/// Filters are applied in order and the first rejection wins.
pub fn discover(
    catalog: &[TestCase],
    phase: Phase,
    filters: &[&dyn TestFilter],
) -> Result<TestPlan, DiscoveryError> {
    let mut cases = Vec::new();
    'cases: for case in catalog.iter().filter(|c| c.phase == phase) {
        for filter in filters {
            if !filter.include(case)? {
                debug!(test = %case.identifier, filter = filter.name(), "Test excluded");
                continue 'cases;
            }
        }
        cases.push(case.clone());
    }
    debug!(%phase, count = cases.len(), "Discovered tests");
    Ok(TestPlan { phase, cases })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::case::{TestContext, TestFailure};
    use crate::observer::RunObserver;
    use crate::precondition::{ManipulationPrecondition, PreconditionContext, PreconditionSpec};
    use async_trait::async_trait;
    use futures::future::BoxFuture;

    fn passing(_ctx: &TestContext) -> BoxFuture<'_, Result<(), TestFailure>> {
        Box::pin(async { Ok(()) })
    }

    #[derive(Default)]
    struct Nudge;

    #[async_trait]
    impl ManipulationPrecondition for Nudge {
        async fn manipulation(&self, _ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
            Ok(true)
        }
    }

    struct Broken;

    #[async_trait]
    impl ManipulationPrecondition for Broken {
        async fn manipulation(&self, _ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
            Ok(true)
        }
    }

    fn case(id: &str, phase: Phase) -> TestCase {
        TestCase::new(TestIdentifier::parse(id).unwrap(), phase, "Suite", "test", passing)
            .with_description("described")
    }

    fn enabled(ids: &[&str]) -> EnabledTests {
        ids.iter()
            .map(|id| (TestIdentifier::parse(*id).unwrap(), true))
            .collect()
    }

    #[test]
    fn test_enabled_filter() {
        let mut tests = enabled(&["A.R1"]);
        tests.set(TestIdentifier::parse("A.R2").unwrap(), false);
        let filter = EnabledFilter::new(tests);

        assert!(filter.include(&case("A.R1", Phase::Direct)).unwrap());
        assert!(!filter.include(&case("A.R2", Phase::Direct)).unwrap());
        assert!(!filter.include(&case("A.R3", Phase::Direct)).unwrap());
    }

    #[test]
    fn test_description_filter() {
        let mut undescribed = case("A.R1", Phase::Direct);
        undescribed.description = None;
        let mut blank = case("A.R1", Phase::Direct);
        blank.description = Some("  ");

        assert!(DescriptionFilter.include(&case("A.R1", Phase::Direct)).unwrap());
        assert!(!DescriptionFilter.include(&undescribed).unwrap());
        assert!(!DescriptionFilter.include(&blank).unwrap());
    }

    #[test]
    fn test_discover_filters_by_phase_in_order() {
        let catalog = vec![
            case("A.R1", Phase::Direct),
            case("A.R2", Phase::Invariant),
            case("A.R3", Phase::Direct),
            case("A.R4", Phase::Direct),
        ];
        let enabled = EnabledFilter::new(enabled(&["A.R1", "A.R2", "A.R4"]));

        let plan = discover(&catalog, Phase::Direct, &[&enabled, &DescriptionFilter]).unwrap();
        let ids: Vec<&str> = plan.cases.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A.R1", "A.R4"]);
    }

    #[test]
    fn test_precondition_filter_registers_only_for_invariant_tests() {
        let registry = Arc::new(PreconditionRegistry::new(RunObserver::new()));
        let filter = PreconditionFilter::new(registry.clone());
        let direct = case("A.R1", Phase::Direct).with_precondition(PreconditionSpec::manipulation::<Nudge>());
        let invariant =
            case("A.R2", Phase::Invariant).with_precondition(PreconditionSpec::manipulation::<Nudge>());

        assert!(filter.include(&direct).unwrap());
        assert!(registry.is_empty());
        assert!(filter.include(&invariant).unwrap());
        assert!(registry.contains::<Nudge>());
    }

    #[test]
    fn test_excluded_tests_do_not_register_preconditions() {
        let registry = Arc::new(PreconditionRegistry::new(RunObserver::new()));
        let precondition_filter = PreconditionFilter::new(registry.clone());
        let enabled_filter = EnabledFilter::new(EnabledTests::new());
        let catalog = vec![case("A.R2", Phase::Invariant)
            .with_precondition(PreconditionSpec::manipulation::<Nudge>())];

        let plan = discover(
            &catalog,
            Phase::Invariant,
            &[&enabled_filter, &DescriptionFilter, &precondition_filter],
        )
        .unwrap();
        assert!(plan.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_failure_is_fatal() {
        let registry = Arc::new(PreconditionRegistry::new(RunObserver::new()));
        let filter = PreconditionFilter::new(registry);
        let failing = PreconditionSpec::manipulation_with::<Broken, _>(|_| {
            Err(PreconditionError::Check {
                name: "Broken",
                reason: "unavailable".into(),
            })
        });
        let catalog = vec![case("A.R2", Phase::Invariant).with_precondition(failing)];

        let err = discover(&catalog, Phase::Invariant, &[&filter]).unwrap_err();
        let DiscoveryError::Precondition { test, .. } = err;
        assert_eq!(test.as_str(), "A.R2");
    }
}
