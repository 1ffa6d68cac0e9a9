//! Run lifecycle
//!
//! Phases run strictly in sequence:
//! 1. basic messaging check and settle interval
//! 2. direct tests
//! 3. preconditions, after a storage flush
//! 4. disconnect, storage flush, invariant tests
//!
//! Only a failed connect aborts the run. Every other failure is recorded in
//! the [`RunObserver`] and the next phase runs. Teardown always runs.

use crate::client::{ClientError, Manipulations, TestClient};
use crate::engine::{
    discover, execute, DescriptionFilter, DiscoveryError, EnabledFilter, EnabledTests,
    ExecutionListener, LoggingListener, PreconditionFilter, RunInfo, SummaryListener, TestCase,
    TestContext, TestPlan, TestSummary,
};
use crate::generator::MessageGenerator;
use crate::manipulation::RecordingManipulations;
use crate::messaging_check::BasicMessagingCheck;
use crate::observer::RunObserver;
use crate::precondition::{ManipulationLocker, PreconditionContext, PreconditionRegistry};
use crate::report::XmlReportListener;
use crate::storage::MessageStorage;
use crate::verdict::summarize_encoding_errors;
use sdccc_types::{DeviceChange, Phase};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

pub const CONNECT_FAILED_REASON: &str = "Could not connect to target device";
pub const PRECONDITION_FAILED_REASON: &str = "Error occurred while running preconditions";
pub const STOP_FAILED_REASON: &str = "Could not stop the test client";

/// Fatal orchestrator errors
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Test discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Could not connect to target device {epr}: {source}")]
    Connection {
        epr: String,
        #[source]
        source: ClientError,
    },
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub consumer_enabled: bool,
    /// Sleep after the basic messaging check
    pub settle: Duration,
    /// Bound on start, stop, connect and disconnect
    pub max_wait: Duration,
    pub test_execution_logging: bool,
    pub summarize_encoding_errors: bool,
    /// Directory receiving the reports
    pub run_dir: PathBuf,
    pub version: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            consumer_enabled: true,
            settle: Duration::from_secs(10),
            max_wait: Duration::from_secs(10),
            test_execution_logging: false,
            summarize_encoding_errors: true,
            run_dir: PathBuf::from("."),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Counts of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub direct: TestSummary,
    pub invariant: TestSummary,
}

impl RunSummary {
    pub fn failures(&self) -> u64 {
        self.direct.total_failure_count() + self.invariant.total_failure_count()
    }

    pub fn tests_run(&self) -> u64 {
        self.direct.tests_started + self.invariant.tests_started
    }
}

struct Plans {
    direct: TestPlan,
    invariant: TestPlan,
}

/// Forwards the client's change feed to the observing preconditions
struct ChangeForwarder {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ChangeForwarder {
    fn spawn(mut changes: broadcast::Receiver<DeviceChange>, registry: Arc<PreconditionRegistry>) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    received = changes.recv() => match received {
                        Ok(change) => registry.dispatch_change(&change),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Change feed lagged, changes were lost");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = &mut stopped => {
                        while let Ok(change) = changes.try_recv() {
                            registry.dispatch_change(&change);
                        }
                        break;
                    }
                }
            }
            debug!("Change forwarding stopped");
        });
        Self { stop, task }
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "Change forwarding task ended abnormally");
        }
    }
}

/// Composition of one test run
pub struct TestSuite {
    config: SuiteConfig,
    client: Arc<dyn TestClient>,
    manipulations: Arc<dyn Manipulations>,
    storage: Arc<dyn MessageStorage>,
    observer: RunObserver,
    registry: Arc<PreconditionRegistry>,
    locker: ManipulationLocker,
    run_info: RunInfo,
    catalog: Vec<TestCase>,
    enabled: EnabledTests,
}

impl TestSuite {
    pub fn new(
        config: SuiteConfig,
        client: Arc<dyn TestClient>,
        manipulations: Arc<dyn Manipulations>,
        storage: Arc<dyn MessageStorage>,
        observer: RunObserver,
        catalog: Vec<TestCase>,
        enabled: EnabledTests,
    ) -> Self {
        let manipulations: Arc<dyn Manipulations> =
            Arc::new(RecordingManipulations::new(manipulations, storage.clone()));
        Self {
            registry: Arc::new(PreconditionRegistry::new(observer.clone())),
            config,
            client,
            manipulations,
            storage,
            observer,
            locker: ManipulationLocker::new(),
            run_info: RunInfo::default(),
            catalog,
            enabled,
        }
    }

    pub fn registry(&self) -> &Arc<PreconditionRegistry> {
        &self.registry
    }

    pub fn observer(&self) -> &RunObserver {
        &self.observer
    }

    fn test_context(&self) -> TestContext {
        TestContext {
            client: self.client.clone(),
            storage: self.storage.clone(),
            generator: MessageGenerator::new(self.client.clone()),
            observer: self.observer.clone(),
            preconditions: self.registry.clone(),
            run_info: self.run_info.clone(),
        }
    }

    fn precondition_context(&self) -> PreconditionContext {
        PreconditionContext {
            client: self.client.clone(),
            storage: self.storage.clone(),
            manipulations: self.manipulations.clone(),
            locker: self.locker.clone(),
            observer: self.observer.clone(),
        }
    }

    async fn bounded<F>(&self, operation: &str, future: F) -> Result<(), ClientError>
    where
        F: Future<Output = Result<(), ClientError>>,
    {
        match tokio::time::timeout(self.config.max_wait, future).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(format!(
                "{} did not finish within {:?}",
                operation, self.config.max_wait
            ))),
        }
    }

    fn discover(&self) -> Result<Plans, DiscoveryError> {
        let enabled = EnabledFilter::new(self.enabled.clone());
        let preconditions = PreconditionFilter::new(self.registry.clone());
        let direct = discover(&self.catalog, Phase::Direct, &[&enabled, &DescriptionFilter])?;
        let invariant = discover(
            &self.catalog,
            Phase::Invariant,
            &[&enabled, &DescriptionFilter, &preconditions],
        )?;
        info!(
            direct = direct.len(),
            invariant = invariant.len(),
            preconditions = self.registry.len(),
            "Discovered tests"
        );
        Ok(Plans { direct, invariant })
    }

    async fn connect(&self) -> Result<(), SuiteError> {
        let epr = self.client.target_epr();
        let result = async {
            self.client.start_service(self.config.max_wait).await?;
            self.bounded("connect", self.client.connect()).await?;
            Ok::<_, ClientError>(())
        }
        .await;
        if let Err(source) = result {
            error!("Could not connect to target device {}", epr);
            self.observer.invalidate_with(CONNECT_FAILED_REASON, &source);
            return Err(SuiteError::Connection { epr, source });
        }

        let generator = MessageGenerator::new(self.client.clone());
        match generator.has_archive_service() {
            Ok(present) => self.run_info.set_archive_service_present(present),
            Err(err) => warn!(error = %err, "Could not determine whether an archive service is hosted"),
        }
        info!(epr = %epr, "Connected to target device");
        Ok(())
    }

    async fn execute_plan(&self, plan: &TestPlan) -> TestSummary {
        let ctx = self.test_context();
        let mut summary = SummaryListener::new();
        let mut report = XmlReportListener::new(
            &self.config.run_dir,
            &self.config.version,
            self.observer.clone(),
            self.storage.clone(),
        );
        let mut logging = LoggingListener;
        let mut listeners: Vec<&mut dyn ExecutionListener> = Vec::with_capacity(3);
        listeners.push(&mut summary);
        listeners.push(&mut report);
        if self.config.test_execution_logging {
            listeners.push(&mut logging);
        }
        execute(plan, &ctx, &mut listeners).await;
        drop(listeners);
        summary.into_summary()
    }

    async fn phase1(&self) {
        info!("Phase 1: basic messaging check");
        let check = BasicMessagingCheck::new(
            MessageGenerator::new(self.client.clone()),
            self.observer.clone(),
        );
        check.run().await;
    }

    async fn phase2(&self, plan: &TestPlan) -> TestSummary {
        info!(tests = plan.len(), "Phase 2: direct tests");
        self.execute_plan(plan).await
    }

    async fn phase3(&self) {
        info!(preconditions = self.registry.len(), "Phase 3: preconditions");
        self.storage.flush().await;
        if let Err(err) = self.registry.run_all(&self.precondition_context()).await {
            warn!(error = %err, "Error occurred while running preconditions");
            self.observer.invalidate(PRECONDITION_FAILED_REASON);
        }
    }

    async fn phase4(&self, plan: &TestPlan, forwarder: Option<ChangeForwarder>) -> TestSummary {
        info!(tests = plan.len(), "Phase 4: invariant tests");
        if self.config.consumer_enabled {
            if let Err(err) = self.bounded("disconnect", self.client.disconnect()).await {
                self.observer.invalidate_with(STOP_FAILED_REASON, &err);
            }
        }
        if let Some(forwarder) = forwarder {
            forwarder.shutdown().await;
        }
        self.storage.flush().await;
        self.execute_plan(plan).await
    }

    async fn teardown(&self) {
        info!("Stopping test run");
        if self.config.consumer_enabled {
            if let Err(err) = self.client.stop_service(self.config.max_wait).await {
                self.observer.invalidate_with(STOP_FAILED_REASON, &err);
            }
        }
        self.storage.close().await;
        summarize_encoding_errors(
            &self.observer,
            self.storage.as_ref(),
            self.config.summarize_encoding_errors,
        );
        let state = self.observer.snapshot();
        if state.invalid {
            warn!(
                "This test run has been deemed invalid, because of: {}",
                state.reasons.join("; ")
            );
        }
    }

    /// Execute the whole run
    ///
    /// Discovery errors return before any device interaction. A failed
    /// connect skips every phase, tears down and returns the error.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<RunSummary, SuiteError> {
        let plans = self.discover()?;
        let mut summary = RunSummary::default();

        let connected = if self.config.consumer_enabled {
            self.connect().await
        } else {
            Ok(())
        };
        if let Err(err) = connected {
            self.teardown().await;
            self.observer.set_total_tests_run(summary.tests_run());
            return Err(err);
        }

        let forwarder = self
            .config
            .consumer_enabled
            .then(|| ChangeForwarder::spawn(self.client.subscribe_changes(), self.registry.clone()));

        if self.config.consumer_enabled {
            self.phase1().await;
        }
        tokio::time::sleep(self.config.settle).await;
        summary.direct = self.phase2(&plans.direct).await;
        self.phase3().await;
        summary.invariant = self.phase4(&plans.invariant, forwarder).await;

        self.teardown().await;
        self.observer.set_total_tests_run(summary.tests_run());
        info!(
            tests_run = summary.tests_run(),
            failures = summary.failures(),
            "Test run finished"
        );
        Ok(summary)
    }
}
