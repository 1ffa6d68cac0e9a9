//! SDCcc shared types
//!
//! Vocabulary shared by the conformance core and the command line tool:
//! - Requirement identifiers and the direct/invariant phase split
//! - Recorded protocol messages and manipulation records
//! - Device change notifications forwarded to observing preconditions
//! - Small SOAP text helpers used by requirement tests

pub mod change;
pub mod error;
pub mod identifier;
pub mod manipulation;
pub mod message;
pub mod soap;

pub use change::{DeviceChange, ReportKind};
pub use error::{TypesError, TypesResult};
pub use identifier::{Phase, TestIdentifier};
pub use manipulation::{ManipulationInfo, ManipulationResult};
pub use message::{Direction, MessageContent, MessageType, Transport};
