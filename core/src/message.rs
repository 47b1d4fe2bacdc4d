//! Broker message envelope
//!
//! A [`Message`] is what the consumer dispatch loop hands to recovery and what
//! the recovery router republishes. The payload is opaque and uses `Bytes`,
//! so republishing a failed message never copies its body:
//!
//! ```text
//! delivery (10KB payload as Bytes)
//!          │
//!          ▼
//! recover() clones the Message  ← refcount bump, properties copied
//!          │
//!          ▼
//! publish("", "retry.orders", &msg)
//! ```
//!
//! Properties mirror the AMQP basic properties holdback cares about plus the
//! delivery-side fields the dispatch loop knows (`consumer_queue`,
//! `received_exchange`, `received_routing_key`). Delivery-side fields are
//! never sent back to the broker.

use crate::headers::{DeathRecord, HeaderValue, Headers, X_DEATH};
use bytes::Bytes;
use std::time::Duration;

/// Message properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageProperties {
    /// MIME type of the payload
    pub content_type: Option<String>,
    /// Application message identifier
    pub message_id: Option<String>,
    /// Correlation identifier
    pub correlation_id: Option<String>,
    /// Per-message TTL as a decimal millisecond string
    ///
    /// This is the broker's own convention; an expiration of `"1500"` makes
    /// the broker expire the message 1.5 seconds after it reaches the head of
    /// its queue.
    pub expiration: Option<String>,
    /// 1 = transient, 2 = persistent
    pub delivery_mode: Option<u8>,
    /// Application and broker headers
    pub headers: Headers,
    /// Queue the message was consumed from (delivery side only)
    pub consumer_queue: Option<String>,
    /// Exchange the message was delivered from (delivery side only)
    pub received_exchange: Option<String>,
    /// Routing key the message was delivered with (delivery side only)
    pub received_routing_key: Option<String>,
}

/// A message consumed from, or published to, a broker queue
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use holdback_core::Message;
///
/// let msg = Message::new(Bytes::from_static(b"order-42")).with_consumer_queue("orders");
/// assert_eq!(msg.properties.consumer_queue.as_deref(), Some("orders"));
/// assert_eq!(msg.redelivery_count(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Opaque payload; holdback never interprets it
    pub payload: Bytes,
    /// Properties and headers
    pub properties: MessageProperties,
}

impl Message {
    /// Create a message with default properties
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            properties: MessageProperties::default(),
        }
    }

    /// Set the queue the message was consumed from
    pub fn with_consumer_queue(mut self, queue: impl Into<String>) -> Self {
        self.properties.consumer_queue = Some(queue.into());
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.properties.headers.insert(key.into(), value.into());
        self
    }

    /// Set the message identifier
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.properties.message_id = Some(id.into());
        self
    }

    /// Set the per-message TTL
    ///
    /// Stored as whole milliseconds in the broker's decimal string format.
    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.set_expiration(ttl);
        self
    }

    /// Set the per-message TTL in place
    pub fn set_expiration(&mut self, ttl: Duration) {
        self.properties.expiration = Some(ttl.as_millis().to_string());
    }

    /// Per-message TTL, if set and well formed
    pub fn expiration(&self) -> Option<Duration> {
        self.properties
            .expiration
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// Header value by key
    #[inline]
    pub fn header(&self, key: &str) -> Option<&HeaderValue> {
        self.properties.headers.get(key)
    }

    /// Most recent `x-death` record
    ///
    /// Returns `None` when the header is absent, is not an array, is empty, or
    /// its first entry has no integer `count`.
    pub fn last_death(&self) -> Option<DeathRecord> {
        self.header(X_DEATH)?
            .as_array()?
            .first()
            .and_then(DeathRecord::from_header)
    }

    /// Raw `count` of the most recent `x-death` record
    ///
    /// The value is what the broker sent and may be negative if the header
    /// was forged; callers decide how to clamp it.
    pub fn redelivery_count(&self) -> Option<i64> {
        self.last_death().map(|record| record.count)
    }

    /// Get payload as a UTF-8 string (if valid)
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::headers::{DeathReason, death_history_header};

    fn death(count: i64, queue: &str) -> DeathRecord {
        DeathRecord {
            count,
            reason: DeathReason::Expired,
            queue: queue.to_string(),
            exchange: String::new(),
            routing_keys: vec![queue.to_string()],
            original_expiration: Some("1000".to_string()),
        }
    }

    #[test]
    fn test_message_creation() {
        let msg = Message::new(Bytes::from_static(b"hello")).with_consumer_queue("orders");
        assert_eq!(msg.payload_str(), Some("hello"));
        assert_eq!(msg.properties.consumer_queue.as_deref(), Some("orders"));
        assert!(msg.properties.headers.is_empty());
        assert!(msg.properties.expiration.is_none());
    }

    #[test]
    fn test_zero_copy_clone() {
        let payload = Bytes::from(vec![7u8; 4096]);
        let ptr = payload.as_ptr();
        let msg = Message::new(payload);
        let cloned = msg.clone();
        assert_eq!(cloned.payload.as_ptr(), ptr);
    }

    #[test]
    fn test_expiration_is_decimal_millis() {
        let msg = Message::new(Bytes::new()).with_expiration(Duration::from_millis(2500));
        assert_eq!(msg.properties.expiration.as_deref(), Some("2500"));
        assert_eq!(msg.expiration(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_malformed_expiration_reads_as_none() {
        let mut msg = Message::new(Bytes::new());
        msg.properties.expiration = Some("soon".to_string());
        assert_eq!(msg.expiration(), None);
    }

    #[test]
    fn test_redelivery_count_absent() {
        let msg = Message::new(Bytes::new());
        assert_eq!(msg.redelivery_count(), None);
        assert!(msg.last_death().is_none());
    }

    #[test]
    fn test_redelivery_count_reads_first_record() {
        let history = death_history_header(&[death(3, "retry.orders"), death(9, "other")]);
        let msg = Message::new(Bytes::new()).with_header(X_DEATH, history);

        assert_eq!(msg.redelivery_count(), Some(3));
        let last = msg.last_death().unwrap();
        assert_eq!(last.queue, "retry.orders");
        assert_eq!(last.reason, DeathReason::Expired);
        assert_eq!(last.original_expiration.as_deref(), Some("1000"));
    }

    #[test]
    fn test_redelivery_count_malformed_shapes() {
        let not_array = Message::new(Bytes::new()).with_header(X_DEATH, "garbage");
        assert_eq!(not_array.redelivery_count(), None);

        let empty = Message::new(Bytes::new()).with_header(X_DEATH, HeaderValue::Array(vec![]));
        assert_eq!(empty.redelivery_count(), None);

        let mut table = Headers::new();
        table.insert("count".to_string(), HeaderValue::from("two"));
        let bad_count = Message::new(Bytes::new())
            .with_header(X_DEATH, HeaderValue::Array(vec![HeaderValue::Table(table)]));
        assert_eq!(bad_count.redelivery_count(), None);
    }

    #[test]
    fn test_death_record_header_round_trip_keeps_fields() {
        let record = death(2, "retry.payments");
        let parsed = DeathRecord::from_header(&record.to_header()).unwrap();
        assert_eq!(parsed, record);
    }
}
