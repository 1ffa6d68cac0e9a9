//! Capability-gated request issuing
//!
//! Every request checks first that the DUT hosts a service with the needed
//! port type and fails with [`ClientError::ServiceNotHosted`] otherwise.

use crate::client::{ClientError, ClientResult, PortType, SdcRequest, SoapResponse, TestClient};
use std::sync::Arc;
use tracing::debug;

/// Issues read-only requests towards the connected DUT
#[derive(Clone)]
pub struct MessageGenerator {
    client: Arc<dyn TestClient>,
}

impl MessageGenerator {
    pub fn new(client: Arc<dyn TestClient>) -> Self {
        Self { client }
    }

    /// Whether any hosted service implements `port_type`
    pub fn hosts(&self, port_type: PortType) -> ClientResult<bool> {
        Ok(self
            .client
            .hosted_services()?
            .iter()
            .any(|service| service.implements(port_type)))
    }

    async fn send(&self, request: SdcRequest) -> ClientResult<SoapResponse> {
        let port_type = request.port_type();
        if !self.hosts(port_type)? {
            return Err(ClientError::ServiceNotHosted(port_type));
        }
        debug!(action = request.action(), "Sending request");
        self.client.send_request(request).await
    }

    pub async fn get_mdib(&self) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetMdib).await
    }

    pub async fn get_md_description(&self, handles: Vec<String>) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetMdDescription { handles }).await
    }

    pub async fn get_md_state(&self, handles: Vec<String>) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetMdState { handles }).await
    }

    pub fn has_context_service(&self) -> ClientResult<bool> {
        self.hosts(PortType::Context)
    }

    pub async fn get_context_states(&self, handles: Vec<String>) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetContextStates { handles }).await
    }

    pub fn has_containment_tree_service(&self) -> ClientResult<bool> {
        self.hosts(PortType::ContainmentTree)
    }

    pub async fn get_containment_tree(&self, handles: Vec<String>) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetContainmentTree { handles }).await
    }

    pub async fn get_descriptor(&self, handles: Vec<String>) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetDescriptor { handles }).await
    }

    pub fn has_localization_service(&self) -> ClientResult<bool> {
        self.hosts(PortType::Localization)
    }

    pub async fn get_localized_texts(&self) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetLocalizedText).await
    }

    pub async fn get_supported_languages(&self) -> ClientResult<SoapResponse> {
        self.send(SdcRequest::GetSupportedLanguages).await
    }

    pub fn has_archive_service(&self) -> ClientResult<bool> {
        self.hosts(PortType::Archive)
    }
}
