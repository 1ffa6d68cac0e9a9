//! Message storage
//!
//! Every message exchanged with the DUT is recorded here. Writers never
//! block; recorded messages become visible to queries once the write
//! buffer is committed, either because it filled up or because `flush`
//! was called.

pub mod encoding;
mod memory;

pub use memory::{InMemoryMessageStorage, CLOSED_STORAGE_REASON};

use async_trait::async_trait;
use futures::stream::{self, Stream};
use sdccc_types::{Direction, ManipulationInfo, MessageContent, MessageType, Transport};
use thiserror::Error;

/// Storage-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage was closed before the call
    #[error("Storage is closed")]
    Closed,

    /// Background writer stopped unexpectedly
    #[error("Storage writer unavailable: {0}")]
    WriterUnavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Messages buffered before an automatic commit
    pub buffer_size: usize,
    /// Check charset and MIME declarations of recorded messages
    pub check_encoding: bool,
    /// Only count encoding problems instead of invalidating per message
    pub summarize_encoding_errors: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            check_encoding: true,
            summarize_encoding_errors: true,
        }
    }
}

/// Selection criteria for stored messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub direction: Option<Direction>,
    pub transport: Option<Transport>,
    pub message_type: Option<MessageType>,
    pub soap_only: bool,
    pub action: Option<String>,
}

impl MessageQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn inbound() -> Self {
        Self {
            direction: Some(Direction::Inbound),
            ..Self::default()
        }
    }

    pub fn outbound() -> Self {
        Self {
            direction: Some(Direction::Outbound),
            ..Self::default()
        }
    }

    pub fn inbound_soap() -> Self {
        Self {
            soap_only: true,
            ..Self::inbound()
        }
    }

    pub fn inbound_soap_responses() -> Self {
        Self {
            message_type: Some(MessageType::Response),
            ..Self::inbound_soap()
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn matches(&self, message: &MessageContent) -> bool {
        self.direction.map_or(true, |d| message.direction == d)
            && self.transport.map_or(true, |t| message.transport == t)
            && self.message_type.map_or(true, |m| message.message_type == m)
            && (!self.soap_only || message.is_soap())
            && self
                .action
                .as_deref()
                .map_or(true, |a| message.action().as_deref() == Some(a))
    }
}

/// Result set handed out by storage queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult<T> {
    items: Vec<T>,
}

impl<T> QueryResult<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn are_objects_present(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        stream::iter(self.items)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for QueryResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Append-only store of recorded messages
#[async_trait]
pub trait MessageStorage: Send + Sync {
    /// Record a message without blocking the caller
    fn add_message(&self, message: MessageContent);

    /// Record an executed manipulation
    fn add_manipulation(&self, info: ManipulationInfo);

    /// Make every message added before this call visible to queries
    async fn flush(&self);

    /// Flush and release the storage. Idempotent.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    fn message_encoding_error_count(&self) -> u64;

    fn invalid_mime_type_error_count(&self) -> u64;

    async fn messages(&self, query: &MessageQuery) -> StorageResult<QueryResult<MessageContent>>;

    async fn manipulations_by_method(
        &self,
        method_name: &str,
    ) -> StorageResult<QueryResult<ManipulationInfo>>;

    async fn inbound_messages(&self) -> StorageResult<QueryResult<MessageContent>> {
        self.messages(&MessageQuery::inbound()).await
    }

    async fn outbound_messages(&self) -> StorageResult<QueryResult<MessageContent>> {
        self.messages(&MessageQuery::outbound()).await
    }

    async fn inbound_soap_messages(&self) -> StorageResult<QueryResult<MessageContent>> {
        self.messages(&MessageQuery::inbound_soap()).await
    }

    async fn inbound_soap_responses(&self) -> StorageResult<QueryResult<MessageContent>> {
        self.messages(&MessageQuery::inbound_soap_responses()).await
    }

    async fn inbound_messages_by_action(
        &self,
        action: &str,
    ) -> StorageResult<QueryResult<MessageContent>> {
        self.messages(&MessageQuery::inbound_soap().with_action(action))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn envelope(action: &str) -> String {
        format!(
            "<s:Envelope><s:Header><wsa:Action>{}</wsa:Action></s:Header><s:Body/></s:Envelope>",
            action
        )
    }

    #[test]
    fn test_query_matching() {
        let response = MessageContent::new(
            Direction::Inbound,
            Transport::Http,
            MessageType::Response,
            envelope("urn:a"),
        );
        let request = MessageContent::new(
            Direction::Outbound,
            Transport::Http,
            MessageType::Request,
            envelope("urn:b"),
        );
        let plain = MessageContent::new(Direction::Inbound, Transport::Udp, MessageType::Other, "x");

        assert!(MessageQuery::inbound_soap_responses().matches(&response));
        assert!(!MessageQuery::inbound_soap_responses().matches(&request));
        assert!(!MessageQuery::inbound_soap().matches(&plain));
        assert!(MessageQuery::inbound().matches(&plain));
        assert!(MessageQuery::outbound().with_action("urn:b").matches(&request));
        assert!(!MessageQuery::all().with_action("urn:b").matches(&response));
        assert!(MessageQuery::all()
            .with_transport(Transport::Udp)
            .matches(&plain));
    }

    #[tokio::test]
    async fn test_query_result_handle() {
        let result = QueryResult::new(vec![1, 2, 3]);
        assert!(result.are_objects_present());
        assert_eq!(result.len(), 3);
        let collected: Vec<i32> = result.into_stream().collect().await;
        assert_eq!(collected, vec![1, 2, 3]);

        let empty: QueryResult<i32> = QueryResult::new(vec![]);
        assert!(!empty.are_objects_present());
    }
}
