//! Simulated DUT
//!
//! Stands in for a real SDC stack. Every exchange is recorded in the
//! message storage the way a real client's interceptors would record it,
//! so the invariant tests have traffic to inspect. Faults can be injected
//! through [`DeviceFaults`].

use crate::client::{
    ClientError, ClientResult, HostedService, Manipulations, PortType, SdcRequest, SoapResponse,
    TestClient,
};
use crate::storage::MessageStorage;
use async_trait::async_trait;
use parking_lot::Mutex;
use sdccc_types::{
    soap::action, DeviceChange, Direction, ManipulationResult, MessageContent, MessageType,
    ReportKind, Transport,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Failures the simulated device can be told to produce
#[derive(Debug, Clone, Default)]
pub struct DeviceFaults {
    /// `connect` fails with this error
    pub connect_error: Option<ClientError>,
    /// `connect` takes this long before completing
    pub connect_delay: Option<Duration>,
    /// `disconnect` takes this long before completing
    pub disconnect_delay: Option<Duration>,
    /// `stop_service` fails with a timeout
    pub stop_failure: bool,
    /// Responses omit the `RelatesTo` header
    pub omit_relates_to: bool,
    /// An archive service is hosted in addition to the regular services
    pub archive_service: bool,
    /// Responses declare a charset that contradicts the HTTP header
    pub bad_charset: bool,
}

/// Configuration of a [`SimulatedDevice`]
#[derive(Debug, Clone)]
pub struct SimulatedDeviceConfig {
    pub target_epr: String,
    pub interface_address: String,
    pub services: Vec<HostedService>,
    pub faults: DeviceFaults,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            target_epr: "urn:uuid:00000000-0000-0000-0000-000000000001".to_string(),
            interface_address: "127.0.0.1".to_string(),
            services: vec![
                HostedService::new(
                    "HighPriorityServices",
                    vec![
                        PortType::Get,
                        PortType::Set,
                        PortType::Context,
                        PortType::DescriptionEvent,
                        PortType::StateEvent,
                        PortType::Waveform,
                    ],
                ),
                HostedService::new("LowPriorityServices", vec![PortType::Localization]),
            ],
            faults: DeviceFaults::default(),
        }
    }
}

/// In-process DUT implementing both the client and the manipulation side
pub struct SimulatedDevice {
    config: SimulatedDeviceConfig,
    storage: Arc<dyn MessageStorage>,
    running: AtomicBool,
    connected: AtomicBool,
    mdib_version: AtomicU64,
    changes: broadcast::Sender<DeviceChange>,
    calls: Mutex<Vec<&'static str>>,
}

impl SimulatedDevice {
    pub fn new(config: SimulatedDeviceConfig, storage: Arc<dyn MessageStorage>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            config,
            storage,
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            mdib_version: AtomicU64::new(0),
            changes,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Names of the lifecycle calls received so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn note(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    fn xaddr(&self) -> String {
        format!("https://{}:6464/{}", self.config.interface_address, self.config.target_epr)
    }

    fn declaration(&self) -> &'static str {
        if self.config.faults.bad_charset {
            r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#
        } else {
            r#"<?xml version="1.0" encoding="UTF-8"?>"#
        }
    }

    fn envelope(&self, action: &str, header_extra: &str, body: &str) -> String {
        format!(
            "{}<s12:Envelope xmlns:s12=\"http://www.w3.org/2003/05/soap-envelope\" \
             xmlns:wsa=\"http://www.w3.org/2005/08/addressing\">\
             <s12:Header><wsa:Action>{}</wsa:Action>\
             <wsa:MessageID>urn:uuid:{}</wsa:MessageID>{}</s12:Header>\
             <s12:Body>{}</s12:Body></s12:Envelope>",
            self.declaration(),
            action,
            Uuid::new_v4(),
            header_extra,
            body
        )
    }

    fn record_http(&self, direction: Direction, message_type: MessageType, body: String) {
        self.storage.add_message(
            MessageContent::new(direction, Transport::Http, message_type, body)
                .with_header("Content-Type", "application/soap+xml; charset=utf-8")
                .with_endpoint(self.xaddr()),
        );
    }

    fn hello(&self) -> String {
        let version = self.mdib_version.load(Ordering::SeqCst);
        self.envelope(
            action::HELLO,
            "",
            &format!(
                "<wsd:Hello xmlns:wsd=\"http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01\">\
                 <wsa:EndpointReference><wsa:Address>{}</wsa:Address></wsa:EndpointReference>\
                 <wsd:XAddrs>{}</wsd:XAddrs>\
                 <wsd:MetadataVersion>{}</wsd:MetadataVersion></wsd:Hello>",
                self.config.target_epr,
                self.xaddr(),
                version
            ),
        )
    }

    fn announce(&self) {
        self.storage.add_message(MessageContent::new(
            Direction::Inbound,
            Transport::Udp,
            MessageType::Other,
            self.hello(),
        ));
    }

    fn response_body(&self, request: &SdcRequest, version: u64) -> (u16, String) {
        let element = request.body_element();
        match request {
            SdcRequest::GetMdib => (
                200,
                format!(
                    "<msg:GetMdibResponse MdibVersion=\"{v}\"><msg:Mdib MdibVersion=\"{v}\">\
                     <pm:MdDescription DescriptionVersion=\"{v}\"/>\
                     <pm:MdState StateVersion=\"{v}\"/></msg:Mdib></msg:GetMdibResponse>",
                    v = version
                ),
            ),
            // The simulated device carries no localized texts.
            SdcRequest::GetLocalizedText => (
                400,
                "<s12:Fault><s12:Code><s12:Value>s12:Receiver</s12:Value></s12:Code>\
                 <s12:Reason><s12:Text xml:lang=\"en\">No localized texts available</s12:Text>\
                 </s12:Reason></s12:Fault>"
                    .to_string(),
            ),
            _ => (
                200,
                format!(
                    "<msg:{e}Response MdibVersion=\"{v}\"/>",
                    e = element,
                    v = version
                ),
            ),
        }
    }

    async fn emit_report(&self, kind: ReportKind) -> ManipulationResult {
        if !self.is_connected() {
            return ManipulationResult::Fail;
        }
        let version = self.mdib_version.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = format!("{}.handle", kind.report_element().to_ascii_lowercase());
        let body = format!(
            "<msg:{e} MdibVersion=\"{v}\"><msg:ReportPart><pm:State DescriptorHandle=\"{h}\"/>\
             </msg:ReportPart></msg:{e}>",
            e = kind.report_element(),
            v = version,
            h = handle
        );
        self.record_http(
            Direction::Inbound,
            MessageType::Request,
            self.envelope(kind.report_action(), "", &body),
        );
        debug!(report = kind.report_element(), version, "Emitted report");
        // Nobody listening is fine.
        let _ = self
            .changes
            .send(DeviceChange::new(kind, vec![handle], version));
        ManipulationResult::Success
    }
}

#[async_trait]
impl TestClient for SimulatedDevice {
    async fn start_service(&self, _wait: Duration) -> ClientResult<()> {
        self.note("start_service");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_service(&self, wait: Duration) -> ClientResult<()> {
        self.note("stop_service");
        self.connected.store(false, Ordering::SeqCst);
        if self.config.faults.stop_failure {
            return Err(ClientError::Timeout(format!(
                "Client did not stop within {:?}",
                wait
            )));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_client_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> ClientResult<()> {
        self.note("connect");
        if !self.is_client_running() {
            return Err(ClientError::Transport("Client is not running".to_string()));
        }
        if let Some(delay) = self.config.faults.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.config.faults.connect_error {
            return Err(err.clone());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.mdib_version.fetch_add(1, Ordering::SeqCst);
        self.announce();
        info!(epr = %self.config.target_epr, "Simulated device connected");
        Ok(())
    }

    async fn disconnect(&self) -> ClientResult<()> {
        self.note("disconnect");
        if let Some(delay) = self.config.faults.disconnect_delay {
            tokio::time::sleep(delay).await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn target_epr(&self) -> String {
        self.config.target_epr.clone()
    }

    fn hosted_services(&self) -> ClientResult<Vec<HostedService>> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let mut services = self.config.services.clone();
        if self.config.faults.archive_service {
            services.push(HostedService::new("ArchiveService", vec![PortType::Archive]));
        }
        Ok(services)
    }

    async fn send_request(&self, request: SdcRequest) -> ClientResult<SoapResponse> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let message_id = format!("urn:uuid:{}", Uuid::new_v4());
        let request_body = format!(
            "<msg:{e}>{handles}</msg:{e}>",
            e = request.body_element(),
            handles = request_handles(&request)
                .iter()
                .map(|h| format!("<msg:HandleRef>{}</msg:HandleRef>", h))
                .collect::<String>()
        );
        self.record_http(
            Direction::Outbound,
            MessageType::Request,
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><s12:Envelope><s12:Header>\
                 <wsa:Action>{}</wsa:Action><wsa:MessageID>{}</wsa:MessageID></s12:Header>\
                 <s12:Body>{}</s12:Body></s12:Envelope>",
                request.action(),
                message_id,
                request_body
            ),
        );

        let version = self.mdib_version.load(Ordering::SeqCst);
        let (status, body) = self.response_body(&request, version);
        let response_action = if status == 200 {
            request.response_action()
        } else {
            action::SOAP_FAULT
        };
        let relates_to = if self.config.faults.omit_relates_to {
            String::new()
        } else {
            format!("<wsa:RelatesTo>{}</wsa:RelatesTo>", message_id)
        };
        let envelope = self.envelope(response_action, &relates_to, &body);
        self.record_http(Direction::Inbound, MessageType::Response, envelope.clone());

        Ok(SoapResponse {
            status,
            action: response_action.to_string(),
            body: envelope,
        })
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<DeviceChange> {
        self.changes.subscribe()
    }
}

fn request_handles(request: &SdcRequest) -> &[String] {
    match request {
        SdcRequest::GetMdDescription { handles }
        | SdcRequest::GetMdState { handles }
        | SdcRequest::GetContextStates { handles }
        | SdcRequest::GetContainmentTree { handles }
        | SdcRequest::GetDescriptor { handles } => handles,
        SdcRequest::GetMdib | SdcRequest::GetLocalizedText | SdcRequest::GetSupportedLanguages => {
            &[]
        }
    }
}

#[async_trait]
impl Manipulations for SimulatedDevice {
    async fn send_hello(&self) -> ManipulationResult {
        if !self.is_client_running() {
            return ManipulationResult::Fail;
        }
        self.announce();
        ManipulationResult::Success
    }

    async fn trigger_report(&self, kind: ReportKind) -> ManipulationResult {
        self.emit_report(kind).await
    }

    async fn trigger_descriptor_update(&self) -> ManipulationResult {
        self.emit_report(ReportKind::Description).await
    }

    async fn set_patient_association(&self, _associated: bool) -> ManipulationResult {
        self.emit_report(ReportKind::Context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MessageGenerator;
    use crate::messaging_check::BasicMessagingCheck;
    use crate::observer::RunObserver;
    use crate::storage::{InMemoryMessageStorage, StorageConfig};
    use sdccc_types::soap;

    fn device(faults: DeviceFaults) -> (Arc<SimulatedDevice>, Arc<dyn MessageStorage>) {
        let storage: Arc<dyn MessageStorage> = Arc::new(InMemoryMessageStorage::new(
            StorageConfig::default(),
            RunObserver::new(),
        ));
        let config = SimulatedDeviceConfig {
            faults,
            ..SimulatedDeviceConfig::default()
        };
        (Arc::new(SimulatedDevice::new(config, storage.clone())), storage)
    }

    async fn connected(faults: DeviceFaults) -> (Arc<SimulatedDevice>, Arc<dyn MessageStorage>) {
        let (device, storage) = device(faults);
        device.start_service(Duration::from_secs(1)).await.unwrap();
        device.connect().await.unwrap();
        (device, storage)
    }

    #[tokio::test]
    async fn test_connect_requires_running_client() {
        let (device, _) = device(DeviceFaults::default());
        assert!(matches!(device.connect().await, Err(ClientError::Transport(_))));
        assert!(matches!(device.hosted_services(), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_announces_hello() {
        let (_device, storage) = connected(DeviceFaults::default()).await;
        storage.flush().await;

        let hellos = storage.inbound_messages_by_action(action::HELLO).await.unwrap();
        assert_eq!(hellos.len(), 1);
        let hello = hellos.into_vec().remove(0);
        assert_eq!(hello.transport, Transport::Udp);
        assert!(soap::element_text(&hello.body_text(), "XAddrs")
            .unwrap()
            .starts_with("https://127.0.0.1"));
    }

    #[tokio::test]
    async fn test_requests_are_recorded_with_relates_to() {
        let (device, storage) = connected(DeviceFaults::default()).await;
        let response = device.send_request(SdcRequest::GetMdib).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(soap::contains_element(&response.body, "MdState"));
        storage.flush().await;

        assert_eq!(storage.outbound_messages().await.unwrap().len(), 1);
        let responses = storage.inbound_soap_responses().await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(soap::contains_element(
            &responses.iter().next().unwrap().body_text(),
            "RelatesTo"
        ));
    }

    #[tokio::test]
    async fn test_omit_relates_to_fault() {
        let (device, _) = connected(DeviceFaults {
            omit_relates_to: true,
            ..DeviceFaults::default()
        })
        .await;
        let response = device.send_request(SdcRequest::GetMdib).await.unwrap();
        assert!(!soap::contains_element(&response.body, "RelatesTo"));
    }

    #[tokio::test]
    async fn test_manipulations_emit_reports_and_changes() {
        let (device, storage) = connected(DeviceFaults::default()).await;
        let mut changes = device.subscribe_changes();

        assert_eq!(
            device.trigger_report(ReportKind::Metric).await,
            ManipulationResult::Success
        );
        let change = changes.recv().await.unwrap();
        assert_eq!(change.kind, ReportKind::Metric);
        assert_eq!(change.mdib_version, 2);

        storage.flush().await;
        let reports = storage
            .inbound_messages_by_action(action::EPISODIC_METRIC_REPORT)
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
    }

    #[tokio::test]
    async fn test_manipulation_without_connection_fails() {
        let (device, _) = device(DeviceFaults::default());
        assert_eq!(
            device.trigger_descriptor_update().await,
            ManipulationResult::Fail
        );
    }

    #[tokio::test]
    async fn test_generator_gates_on_hosted_services() {
        let (device, _) = connected(DeviceFaults::default()).await;
        let generator = MessageGenerator::new(device.clone());

        assert!(generator.has_context_service().unwrap());
        assert!(!generator.has_containment_tree_service().unwrap());
        assert!(!generator.has_archive_service().unwrap());
        assert_eq!(
            generator.get_containment_tree(vec![]).await.unwrap_err(),
            ClientError::ServiceNotHosted(PortType::ContainmentTree)
        );
        assert!(generator.get_localized_texts().await.unwrap().is_fault());
    }

    #[tokio::test]
    async fn test_basic_messaging_check_populates_storage() {
        let (device, storage) = connected(DeviceFaults::default()).await;
        let observer = RunObserver::new();
        let check = BasicMessagingCheck::new(MessageGenerator::new(device), observer.clone());

        let outcome = check.run().await;
        // GetMdib, GetMdDescription, GetMdState, GetContextStates and both localization calls
        assert_eq!(outcome.attempted, 6);
        assert_eq!(outcome.failed, 0);
        assert!(!observer.is_invalid());

        storage.flush().await;
        assert_eq!(storage.inbound_soap_responses().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_basic_messaging_check_tolerates_lost_connection() {
        let (device, _) = connected(DeviceFaults::default()).await;
        device.disconnect().await.unwrap();
        let check = BasicMessagingCheck::new(MessageGenerator::new(device), RunObserver::new());

        let outcome = check.run().await;
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.failed, 3);
    }

    #[tokio::test]
    async fn test_bad_charset_is_counted_by_storage() {
        let (device, storage) = connected(DeviceFaults {
            bad_charset: true,
            ..DeviceFaults::default()
        })
        .await;
        device.send_request(SdcRequest::GetMdib).await.unwrap();
        // Hello plus the response carry the contradicting declaration.
        assert_eq!(storage.message_encoding_error_count(), 2);
    }
}
