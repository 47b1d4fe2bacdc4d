//! holdback-core - Core types for delayed-retry message recovery
//!
//! This crate provides the types shared between the retry engine and the
//! broker adapters that plug into it:
//!
//! - [`Message`] - a consumed or republished broker message (zero-copy payload)
//! - [`BrokerAdmin`] / [`BrokerPublisher`] - the two broker capabilities holdback needs
//! - [`BrokerError`] - error type for broker operations
//! - [`HeaderValue`] / [`DeathRecord`] - typed headers and redelivery history
//! - [`queue`] - naming conventions and [`QueueSpec`] declaration records
//!
//! # Why this crate exists
//!
//! Broker adapters (AMQP clients, in-memory test brokers) only need the
//! collaborator traits and the message type. Keeping them here lets an
//! adapter crate implement the traits without depending on the retry engine:
//!
//! ```text
//! holdback-core ◄── holdback-retry ◄── holdback-runtime
//!       ▲
//!       └────────── your broker adapter
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod broker;
mod error;
/// Typed headers and the `x-death` redelivery history
pub mod headers;
/// The broker message envelope
pub mod message;
/// Queue naming conventions and declaration records
pub mod queue;

pub use broker::{BrokerAdmin, BrokerPublisher};
pub use error::BrokerError;
pub use headers::{DeathReason, DeathRecord, HeaderValue, Headers};
pub use message::{Message, MessageProperties};
pub use queue::{
    DEFAULT_EXCHANGE, DLQ_QUEUE_PREFIX, QueueSpec, RETRY_QUEUE_PREFIX, dlq_queue_name,
    retry_queue_name,
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==========================================================================
    // BrokerError Tests
    // ==========================================================================

    #[test]
    fn test_broker_error_unavailable_display() {
        let err = BrokerError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "broker unavailable: connection refused");
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_broker_error_declare_display() {
        let err = BrokerError::Declare {
            queue: "orders".to_string(),
            reason: "access refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to declare queue 'orders': access refused"
        );
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_broker_error_publish_display() {
        let err = BrokerError::Publish {
            routing_key: "retry.orders".to_string(),
            reason: "nack".to_string(),
        };
        assert_eq!(err.to_string(), "failed to publish to 'retry.orders': nack");
    }

    #[test]
    fn test_broker_error_unroutable_display() {
        let err = BrokerError::Unroutable {
            exchange: String::new(),
            routing_key: "missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unroutable message: exchange '', routing key 'missing'"
        );
    }

    #[test]
    fn test_broker_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BrokerError>();
    }

    // ==========================================================================
    // Naming Tests
    // ==========================================================================

    #[test]
    fn test_satellite_queue_names() {
        assert_eq!(retry_queue_name("orders"), "retry.orders");
        assert_eq!(dlq_queue_name("orders"), "dlq.orders");
        assert_eq!(DEFAULT_EXCHANGE, "");
    }

    #[test]
    fn test_queue_spec_dead_letter_arguments() {
        let spec = QueueSpec::durable_quorum("orders").with_dead_letter("", "dlq.orders");
        assert!(spec.durable);
        assert!(spec.quorum);
        assert_eq!(spec.dead_letter_exchange(), Some(""));
        assert_eq!(spec.dead_letter_routing_key(), Some("dlq.orders"));
        assert_eq!(spec.arguments.len(), 2);

        let terminal = QueueSpec::durable_quorum("dlq.orders");
        assert!(terminal.arguments.is_empty());
        assert_eq!(terminal.dead_letter_exchange(), None);
    }

    // ==========================================================================
    // Collaborator Trait Tests
    // ==========================================================================

    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::sync::Mutex;

    /// Test publisher that records every call
    struct RecordingPublisher {
        published: Mutex<Vec<(String, String, Message)>>,
    }

    #[async_trait]
    impl BrokerPublisher for RecordingPublisher {
        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            message: &Message,
        ) -> Result<(), BrokerError> {
            self.published.lock().unwrap().push((
                exchange.to_string(),
                routing_key.to_string(),
                message.clone(),
            ));
            Ok(())
        }
    }

    struct DownAdmin;

    #[async_trait]
    impl BrokerAdmin for DownAdmin {
        async fn declare_queue(&self, _: &QueueSpec) -> Result<(), BrokerError> {
            Err(BrokerError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publisher_as_trait_object() {
        let publisher = Arc::new(RecordingPublisher {
            published: Mutex::new(Vec::new()),
        });
        let dyn_publisher: Arc<dyn BrokerPublisher> = publisher.clone();

        let msg = Message::new(Bytes::from_static(b"x"));
        dyn_publisher
            .publish(DEFAULT_EXCHANGE, "retry.orders", &msg)
            .await
            .unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "");
        assert_eq!(published[0].1, "retry.orders");
        assert_eq!(published[0].2.payload, Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_admin_error_propagates() {
        let admin: Box<dyn BrokerAdmin> = Box::new(DownAdmin);
        let result = admin
            .declare_queue(&QueueSpec::durable_quorum("orders"))
            .await;
        assert_eq!(result, Err(BrokerError::Unavailable("down".to_string())));
    }
}
