//! Recorded protocol messages

use crate::soap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Direction of a message relative to the test tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the DUT, received by SDCcc
    Inbound,
    /// Sent by SDCcc
    Outbound,
}

/// Transport the message travelled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Udp,
}

/// Role of a message within its exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    /// Multicast or otherwise unpaired traffic
    Other,
}

/// Immutable record of one exchanged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub id: Uuid,
    /// BLAKE3 hex digest of the raw body
    pub hash: String,
    pub direction: Direction,
    pub transport: Transport,
    pub message_type: MessageType,
    /// Header names are stored lower-cased
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub endpoint: Option<String>,
}

impl MessageContent {
    /// Create a record stamped with the current time
    pub fn new(
        direction: Direction,
        transport: Transport,
        message_type: MessageType,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        let body = body.into();
        Self {
            id: Uuid::new_v4(),
            hash: blake3::hash(&body).to_hex().to_string(),
            direction,
            transport,
            message_type,
            headers: BTreeMap::new(),
            body,
            timestamp: Utc::now(),
            endpoint: None,
        }
    }

    /// Add a header value, keeping earlier values for the same name
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8 with any byte order mark removed
    pub fn body_text(&self) -> Cow<'_, str> {
        let bytes = self
            .body
            .strip_prefix(&[0xEF, 0xBB, 0xBF])
            .unwrap_or(&self.body);
        String::from_utf8_lossy(bytes)
    }

    pub fn is_soap(&self) -> bool {
        soap::contains_element(&self.body_text(), "Envelope")
    }

    /// WS-Addressing action of a SOAP message
    pub fn action(&self) -> Option<String> {
        soap::element_text(&self.body_text(), "Action").map(str::to_string)
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_MDIB_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s12:Envelope xmlns:s12="http://www.w3.org/2003/05/soap-envelope" xmlns:wsa="http://www.w3.org/2005/08/addressing">
<s12:Header><wsa:Action>http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdibResponse</wsa:Action></s12:Header>
<s12:Body/></s12:Envelope>"#;

    #[test]
    fn test_hash_is_content_addressed() {
        let a = MessageContent::new(Direction::Inbound, Transport::Http, MessageType::Response, "abc");
        let b = MessageContent::new(Direction::Outbound, Transport::Udp, MessageType::Other, "abc");
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let msg = MessageContent::new(Direction::Inbound, Transport::Http, MessageType::Response, "")
            .with_header("Content-Type", "application/soap+xml; charset=utf-8")
            .with_header("X-Trace", "1")
            .with_header("x-trace", "2");

        assert_eq!(
            msg.content_type(),
            Some("application/soap+xml; charset=utf-8")
        );
        assert_eq!(msg.header("X-TRACE"), Some("1"));
        assert_eq!(msg.headers["x-trace"].len(), 2);
    }

    #[test]
    fn test_soap_accessors() {
        let msg = MessageContent::new(
            Direction::Inbound,
            Transport::Http,
            MessageType::Response,
            GET_MDIB_RESPONSE,
        );
        assert!(msg.is_soap());
        assert!(msg.action().unwrap().ends_with("GetMdibResponse"));
    }

    #[test]
    fn test_body_text_strips_bom() {
        let mut body = vec![0xEF, 0xBB, 0xBF];
        body.extend_from_slice(b"<a/>");
        let msg = MessageContent::new(Direction::Inbound, Transport::Udp, MessageType::Other, body);
        assert_eq!(msg.body_text(), "<a/>");
    }
}
