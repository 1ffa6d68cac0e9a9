//! Collaborator interfaces towards the SDC communication stack

use async_trait::async_trait;
use sdccc_types::{soap::action, DeviceChange, ManipulationResult, ReportKind};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised by the communication stack
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation did not finish within its wait bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transport level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message interceptor rejected the exchange
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// Operation needs an established connection
    #[error("Client is not connected")]
    NotConnected,

    /// DUT does not host a service with the needed port type
    #[error("No hosted service provides port type {0}")]
    ServiceNotHosted(PortType),

    /// Request was sent but the exchange failed
    #[error("Messaging error: {0}")]
    Messaging(String),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// WSDL port types a hosted service may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    Get,
    Set,
    Context,
    DescriptionEvent,
    StateEvent,
    Waveform,
    ContainmentTree,
    Localization,
    Archive,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortType::Get => "GetService",
            PortType::Set => "SetService",
            PortType::Context => "ContextService",
            PortType::DescriptionEvent => "DescriptionEventService",
            PortType::StateEvent => "StateEventService",
            PortType::Waveform => "WaveformService",
            PortType::ContainmentTree => "ContainmentTreeService",
            PortType::Localization => "LocalizationService",
            PortType::Archive => "ArchiveService",
        };
        f.write_str(name)
    }
}

/// A service hosted by the DUT, as announced in its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedService {
    pub service_id: String,
    pub port_types: Vec<PortType>,
}

impl HostedService {
    pub fn new(service_id: impl Into<String>, port_types: Vec<PortType>) -> Self {
        Self {
            service_id: service_id.into(),
            port_types,
        }
    }

    pub fn implements(&self, port_type: PortType) -> bool {
        self.port_types.contains(&port_type)
    }
}

/// Read-only requests the suite issues towards the DUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdcRequest {
    GetMdib,
    GetMdDescription { handles: Vec<String> },
    GetMdState { handles: Vec<String> },
    GetContextStates { handles: Vec<String> },
    GetContainmentTree { handles: Vec<String> },
    GetDescriptor { handles: Vec<String> },
    GetLocalizedText,
    GetSupportedLanguages,
}

impl SdcRequest {
    pub fn action(&self) -> &'static str {
        match self {
            SdcRequest::GetMdib => action::GET_MDIB,
            SdcRequest::GetMdDescription { .. } => action::GET_MD_DESCRIPTION,
            SdcRequest::GetMdState { .. } => action::GET_MD_STATE,
            SdcRequest::GetContextStates { .. } => action::GET_CONTEXT_STATES,
            SdcRequest::GetContainmentTree { .. } => action::GET_CONTAINMENT_TREE,
            SdcRequest::GetDescriptor { .. } => action::GET_DESCRIPTOR,
            SdcRequest::GetLocalizedText => action::GET_LOCALIZED_TEXT,
            SdcRequest::GetSupportedLanguages => action::GET_SUPPORTED_LANGUAGES,
        }
    }

    /// Action of the matching response
    pub fn response_action(&self) -> &'static str {
        match self {
            SdcRequest::GetMdib => action::GET_MDIB_RESPONSE,
            SdcRequest::GetMdDescription { .. } => action::GET_MD_DESCRIPTION_RESPONSE,
            SdcRequest::GetMdState { .. } => action::GET_MD_STATE_RESPONSE,
            SdcRequest::GetContextStates { .. } => action::GET_CONTEXT_STATES_RESPONSE,
            SdcRequest::GetContainmentTree { .. } => action::GET_CONTAINMENT_TREE_RESPONSE,
            SdcRequest::GetDescriptor { .. } => action::GET_DESCRIPTOR_RESPONSE,
            SdcRequest::GetLocalizedText => action::GET_LOCALIZED_TEXT_RESPONSE,
            SdcRequest::GetSupportedLanguages => action::GET_SUPPORTED_LANGUAGES_RESPONSE,
        }
    }

    /// Port type of the service answering this request
    pub fn port_type(&self) -> PortType {
        match self {
            SdcRequest::GetMdib
            | SdcRequest::GetMdDescription { .. }
            | SdcRequest::GetMdState { .. } => PortType::Get,
            SdcRequest::GetContextStates { .. } => PortType::Context,
            SdcRequest::GetContainmentTree { .. } | SdcRequest::GetDescriptor { .. } => {
                PortType::ContainmentTree
            }
            SdcRequest::GetLocalizedText | SdcRequest::GetSupportedLanguages => {
                PortType::Localization
            }
        }
    }

    /// Local name of the request body element
    pub fn body_element(&self) -> &'static str {
        self.action().rsplit('/').next().unwrap_or_default()
    }
}

/// Response to an [`SdcRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    /// Binding level status, e.g. the HTTP status code
    pub status: u16,
    pub action: String,
    pub body: String,
}

impl SoapResponse {
    pub fn is_fault(&self) -> bool {
        sdccc_types::soap::is_fault(&self.body)
    }
}

/// Consumer-side handle on the DUT
///
/// Implementations record every exchanged message in the message storage.
#[async_trait]
pub trait TestClient: Send + Sync {
    /// Start the underlying stack, failing with [`ClientError::Timeout`] after `wait`
    async fn start_service(&self, wait: Duration) -> ClientResult<()>;

    /// Stop the underlying stack, failing with [`ClientError::Timeout`] after `wait`
    async fn stop_service(&self, wait: Duration) -> ClientResult<()>;

    fn is_client_running(&self) -> bool;

    /// Discover and connect to the target device
    async fn connect(&self) -> ClientResult<()>;

    async fn disconnect(&self) -> ClientResult<()>;

    /// Endpoint reference of the target device
    fn target_epr(&self) -> String;

    /// Services hosted by the connected device
    fn hosted_services(&self) -> ClientResult<Vec<HostedService>>;

    async fn send_request(&self, request: SdcRequest) -> ClientResult<SoapResponse>;

    /// Feed of MDIB changes reported by the connected device
    fn subscribe_changes(&self) -> broadcast::Receiver<DeviceChange>;
}

/// Device manipulations used by preconditions
#[async_trait]
pub trait Manipulations: Send + Sync {
    /// Make the device announce itself with a Hello
    async fn send_hello(&self) -> ManipulationResult;

    /// Cause a state change delivered with a report of `kind`
    async fn trigger_report(&self, kind: ReportKind) -> ManipulationResult;

    /// Cause a descriptor modification
    async fn trigger_descriptor_update(&self) -> ManipulationResult;

    /// Associate or disassociate a patient
    async fn set_patient_association(&self, associated: bool) -> ManipulationResult;
}
