//! # sdccc-core
//!
//! Orchestration core of the SDCcc conformance suite.
//!
//! A run connects to the device under test, records every exchanged
//! message, runs the direct tests against the live connection, brings the
//! device into the states the invariant tests need, disconnects and runs
//! the invariant tests against the recorded messages. Anything that makes
//! the result untrustworthy is collected by the [`RunObserver`] and turns
//! into a non-zero exit code.
//!
//! ## Layout
//!
//! - [`observer`] and [`logging`]: run validity
//! - [`client`], [`storage`], [`generator`]: collaborators
//! - [`precondition`]: check-and-repair units executed before disconnect
//! - [`engine`], [`requirements`]: test descriptors, discovery, execution
//! - [`suite`], [`verdict`], [`report`]: lifecycle and results
//! - [`simulation`]: in-process device for runs without an SDC stack

pub mod client;
pub mod engine;
pub mod generator;
pub mod logging;
pub mod manipulation;
pub mod messaging_check;
pub mod observer;
pub mod precondition;
pub mod report;
pub mod requirements;
pub mod simulation;
pub mod storage;
pub mod suite;
pub mod verdict;

pub use client::{ClientError, ClientResult, HostedService, Manipulations, PortType, TestClient};
pub use engine::{EnabledTests, TestCase, TestContext, TestFailure};
pub use logging::{ErrorTriggerLayer, ERROR_TRIGGER_REASON};
pub use observer::{RunObserver, RunState};
pub use precondition::{PreconditionError, PreconditionRegistry, PreconditionSpec};
pub use simulation::{DeviceFaults, SimulatedDevice, SimulatedDeviceConfig};
pub use storage::{InMemoryMessageStorage, MessageStorage, StorageConfig};
pub use suite::{RunSummary, SuiteConfig, SuiteError, TestSuite};
pub use verdict::{exit_code, EXIT_ERROR, EXIT_FAILURE, EXIT_SUCCESS};

pub use sdccc_types::{DeviceChange, Phase, TestIdentifier};
