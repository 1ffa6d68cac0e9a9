//! In-memory message storage with a buffered background writer

use super::encoding::{check_encoding, check_mime_type};
use super::{MessageQuery, MessageStorage, QueryResult, StorageConfig, StorageResult};
use crate::observer::RunObserver;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sdccc_types::{ManipulationInfo, MessageContent, Transport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Reason recorded when a message arrives after `close`
pub const CLOSED_STORAGE_REASON: &str = "addMessageContent called on closed storage";

enum WriterCommand {
    Message(MessageContent),
    Manipulation(ManipulationInfo),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Committed {
    messages: Vec<MessageContent>,
    manipulations: Vec<ManipulationInfo>,
}

/// Message storage keeping committed data in memory
///
/// Must be created inside a tokio runtime; the writer runs as a task.
pub struct InMemoryMessageStorage {
    config: StorageConfig,
    observer: RunObserver,
    sender: Mutex<Option<mpsc::UnboundedSender<WriterCommand>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    committed: Arc<RwLock<Committed>>,
    closed: AtomicBool,
    encoding_errors: AtomicU64,
    mime_errors: AtomicU64,
}

impl InMemoryMessageStorage {
    pub fn new(config: StorageConfig, observer: RunObserver) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let committed = Arc::new(RwLock::new(Committed::default()));
        let writer = tokio::spawn(run_writer(rx, committed.clone(), config.buffer_size.max(1)));
        Self {
            config,
            observer,
            sender: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            committed,
            closed: AtomicBool::new(false),
            encoding_errors: AtomicU64::new(0),
            mime_errors: AtomicU64::new(0),
        }
    }

    fn send(&self, command: WriterCommand) -> bool {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    fn check_message(&self, message: &MessageContent) {
        let content_type = message.content_type();

        if let Err(issue) = check_encoding(content_type, &message.body) {
            self.encoding_errors.fetch_add(1, Ordering::SeqCst);
            debug!(message_id = %message.id, %issue, "Message with invalid encoding declaration");
            if !self.config.summarize_encoding_errors {
                self.observer.invalidate(format!(
                    "Message {} has an invalid encoding declaration: {}",
                    message.id, issue
                ));
            }
        }

        if message.transport == Transport::Http && !message.body.is_empty() {
            if let Err(detail) = check_mime_type(content_type) {
                self.mime_errors.fetch_add(1, Ordering::SeqCst);
                debug!(message_id = %message.id, %detail, "Message with invalid Mime Type");
                if !self.config.summarize_encoding_errors {
                    self.observer.invalidate(format!(
                        "Message {} has an invalid Mime Type declaration: {}",
                        message.id, detail
                    ));
                }
            }
        }
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    committed: Arc<RwLock<Committed>>,
    buffer_size: usize,
) {
    let mut pending: Vec<MessageContent> = Vec::with_capacity(buffer_size);
    let commit = |pending: &mut Vec<MessageContent>| {
        if !pending.is_empty() {
            committed.write().messages.append(pending);
        }
    };

    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Message(message) => {
                pending.push(message);
                if pending.len() >= buffer_size {
                    commit(&mut pending);
                }
            }
            WriterCommand::Manipulation(info) => {
                committed.write().manipulations.push(info);
            }
            WriterCommand::Flush(ack) => {
                commit(&mut pending);
                let _ = ack.send(());
            }
        }
    }
    commit(&mut pending);
    debug!("Message storage writer stopped");
}

#[async_trait]
impl MessageStorage for InMemoryMessageStorage {
    fn add_message(&self, message: MessageContent) {
        if self.closed.load(Ordering::SeqCst) {
            self.observer.invalidate(CLOSED_STORAGE_REASON);
            return;
        }
        if self.config.check_encoding {
            self.check_message(&message);
        }
        if !self.send(WriterCommand::Message(message)) {
            warn!("Message storage writer is gone, dropping message");
        }
    }

    fn add_manipulation(&self, info: ManipulationInfo) {
        if self.closed.load(Ordering::SeqCst) {
            self.observer.invalidate(CLOSED_STORAGE_REASON);
            return;
        }
        if !self.send(WriterCommand::Manipulation(info)) {
            warn!("Message storage writer is gone, dropping manipulation record");
        }
    }

    async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.send(WriterCommand::Flush(ack_tx)) {
            let _ = ack_rx.await;
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.flush().await;
        drop(self.sender.lock().take());
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(err) = writer.await {
                warn!(error = %err, "Message storage writer ended abnormally");
            }
        }
        debug!("Message storage closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn message_encoding_error_count(&self) -> u64 {
        self.encoding_errors.load(Ordering::SeqCst)
    }

    fn invalid_mime_type_error_count(&self) -> u64 {
        self.mime_errors.load(Ordering::SeqCst)
    }

    async fn messages(&self, query: &MessageQuery) -> StorageResult<QueryResult<MessageContent>> {
        let committed = self.committed.read();
        let items = committed
            .messages
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        Ok(QueryResult::new(items))
    }

    async fn manipulations_by_method(
        &self,
        method_name: &str,
    ) -> StorageResult<QueryResult<ManipulationInfo>> {
        let committed = self.committed.read();
        let items = committed
            .manipulations
            .iter()
            .filter(|m| m.method_name == method_name)
            .cloned()
            .collect();
        Ok(QueryResult::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MessageQuery;
    use chrono::Utc;
    use sdccc_types::{Direction, ManipulationResult, MessageType};

    const UTF8_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope><s:Body/></s:Envelope>"#;
    const LATIN1_BODY: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?><s:Envelope><s:Body/></s:Envelope>"#;

    fn http_response(body: &str, content_type: &str) -> MessageContent {
        MessageContent::new(Direction::Inbound, Transport::Http, MessageType::Response, body)
            .with_header("Content-Type", content_type)
    }

    fn storage(buffer_size: usize, summarize: bool) -> (InMemoryMessageStorage, RunObserver) {
        let observer = RunObserver::new();
        let config = StorageConfig {
            buffer_size,
            check_encoding: true,
            summarize_encoding_errors: summarize,
        };
        (InMemoryMessageStorage::new(config, observer.clone()), observer)
    }

    #[tokio::test]
    async fn test_messages_visible_after_flush() {
        let (storage, _) = storage(100, true);
        storage.add_message(http_response(UTF8_BODY, "application/soap+xml; charset=utf-8"));

        assert!(!storage.inbound_messages().await.unwrap().are_objects_present());
        storage.flush().await;
        assert_eq!(storage.inbound_messages().await.unwrap().len(), 1);
        assert_eq!(storage.inbound_soap_responses().await.unwrap().len(), 1);
        assert!(storage.outbound_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_buffer_commits() {
        let (storage, _) = storage(2, true);
        for _ in 0..2 {
            storage.add_message(http_response(UTF8_BODY, "application/soap+xml"));
        }
        // A flush of an empty buffer still acts as a barrier for the two commits.
        storage.flush().await;
        assert_eq!(storage.messages(&MessageQuery::all()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_summarized_encoding_errors_are_counted() {
        let (storage, observer) = storage(100, true);
        storage.add_message(http_response(LATIN1_BODY, "application/soap+xml; charset=utf-8"));
        storage.add_message(http_response(UTF8_BODY, "text/xml"));
        storage.flush().await;

        assert_eq!(storage.message_encoding_error_count(), 1);
        assert_eq!(storage.invalid_mime_type_error_count(), 1);
        assert!(!observer.is_invalid());
    }

    #[tokio::test]
    async fn test_unsummarized_encoding_error_invalidates() {
        let (storage, observer) = storage(100, false);
        storage.add_message(http_response(LATIN1_BODY, "application/soap+xml"));

        assert_eq!(storage.message_encoding_error_count(), 1);
        assert!(observer.is_invalid());
        assert!(observer.reasons()[0].contains("invalid encoding declaration"));
    }

    #[tokio::test]
    async fn test_udp_messages_skip_mime_check() {
        let (storage, _) = storage(100, true);
        storage.add_message(MessageContent::new(
            Direction::Inbound,
            Transport::Udp,
            MessageType::Other,
            UTF8_BODY,
        ));
        assert_eq!(storage.invalid_mime_type_error_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_writes() {
        let (storage, observer) = storage(100, true);
        storage.add_message(http_response(UTF8_BODY, "application/soap+xml"));
        storage.close().await;
        storage.close().await;

        assert!(storage.is_closed());
        assert_eq!(storage.inbound_messages().await.unwrap().len(), 1);
        assert!(!observer.is_invalid());

        storage.add_message(http_response(UTF8_BODY, "application/soap+xml"));
        assert!(observer.is_invalid());
        assert_eq!(observer.reasons(), vec![CLOSED_STORAGE_REASON.to_string()]);
    }

    #[tokio::test]
    async fn test_manipulation_records() {
        let (storage, _) = storage(100, true);
        let now = Utc::now();
        storage.add_manipulation(ManipulationInfo::new(
            "send_hello",
            vec![],
            ManipulationResult::Success,
            now,
            now,
        ));
        storage.flush().await;

        assert_eq!(storage.manipulations_by_method("send_hello").await.unwrap().len(), 1);
        assert!(storage
            .manipulations_by_method("trigger_report")
            .await
            .unwrap()
            .is_empty());
    }
}
