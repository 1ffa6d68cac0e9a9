//! Test descriptors and the context test bodies run against

use crate::client::{ClientError, TestClient};
use crate::generator::MessageGenerator;
use crate::observer::RunObserver;
use crate::precondition::{PreconditionRegistry, PreconditionSpec};
use crate::storage::{MessageStorage, StorageError};
use futures::future::BoxFuture;
use sdccc_types::{Phase, TestIdentifier};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Why a test did not pass
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TestFailure {
    /// A checked property does not hold
    #[error("{0}")]
    Assertion(String),

    /// The storage holds nothing the test could check
    #[error("{0}")]
    NoTestData(String),

    /// The test does not apply to this DUT
    #[error("{0}")]
    Aborted(String),

    /// The test could not be carried out
    #[error("{0}")]
    Error(String),
}

impl TestFailure {
    /// Type name used in the report
    pub fn type_name(&self) -> &'static str {
        match self {
            TestFailure::Assertion(_) => "AssertionError",
            TestFailure::NoTestData(_) => "NoTestData",
            TestFailure::Aborted(_) => "TestAborted",
            TestFailure::Error(_) => "Error",
        }
    }
}

impl From<StorageError> for TestFailure {
    fn from(err: StorageError) -> Self {
        TestFailure::Error(err.to_string())
    }
}

impl From<ClientError> for TestFailure {
    fn from(err: ClientError) -> Self {
        TestFailure::Error(err.to_string())
    }
}

/// Facts about the connection established for this run
#[derive(Debug, Clone, Default)]
pub struct RunInfo {
    archive_service_present: Arc<AtomicBool>,
}

impl RunInfo {
    pub fn set_archive_service_present(&self, present: bool) {
        self.archive_service_present.store(present, Ordering::SeqCst);
    }

    pub fn archive_service_present(&self) -> bool {
        self.archive_service_present.load(Ordering::SeqCst)
    }
}

/// Handles a test body may use
#[derive(Clone)]
pub struct TestContext {
    pub client: Arc<dyn TestClient>,
    pub storage: Arc<dyn MessageStorage>,
    pub generator: MessageGenerator,
    pub observer: RunObserver,
    pub preconditions: Arc<PreconditionRegistry>,
    pub run_info: RunInfo,
}

/// Async test body
pub type TestBody = for<'a> fn(&'a TestContext) -> BoxFuture<'a, Result<(), TestFailure>>;

/// A requirement test as registered in the catalog
#[derive(Clone)]
pub struct TestCase {
    pub identifier: TestIdentifier,
    pub phase: Phase,
    pub class_name: &'static str,
    pub name: &'static str,
    pub description: Option<&'static str>,
    pub preconditions: Vec<PreconditionSpec>,
    pub body: TestBody,
}

impl TestCase {
    pub fn new(
        identifier: TestIdentifier,
        phase: Phase,
        class_name: &'static str,
        name: &'static str,
        body: TestBody,
    ) -> Self {
        Self {
            identifier,
            phase,
            class_name,
            name,
            description: None,
            preconditions: Vec::new(),
            body,
        }
    }

    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_precondition(mut self, precondition: PreconditionSpec) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Stable identifier of the test within the report
    pub fn unique_id(&self) -> String {
        format!("[class:{}]/[method:{}()]", self.class_name, self.name)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("identifier", &self.identifier)
            .field("phase", &self.phase)
            .field("class_name", &self.class_name)
            .field("name", &self.name)
            .field("preconditions", &self.preconditions)
            .finish()
    }
}
