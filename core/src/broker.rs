//! Broker collaborator traits
//!
//! holdback does not manage connections or channels. It needs exactly two
//! capabilities from whatever broker client the application uses:
//!
//! - [`BrokerAdmin`] declares queues at startup
//! - [`BrokerPublisher`] republishes failed messages at runtime

use crate::error::BrokerError;
use crate::message::Message;
use crate::queue::QueueSpec;
use async_trait::async_trait;

/// Queue declaration capability
///
/// # Implementation Requirements
///
/// - Re-declaring a queue with an identical [`QueueSpec`] must succeed and
///   change nothing
/// - Failures are reported, never retried internally
///
/// # Example
///
/// ```ignore
/// use holdback_core::{BrokerAdmin, BrokerError, QueueSpec};
/// use async_trait::async_trait;
///
/// struct LoggingAdmin;
///
/// #[async_trait]
/// impl BrokerAdmin for LoggingAdmin {
///     async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
///         println!("declare {} {:?}", spec.name, spec.arguments);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Declare a queue
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError>;
}

/// Publish capability
///
/// Called concurrently from many recovery invocations. Implementations must
/// be safe to share across tasks, either by being thread-safe themselves or
/// by holding one channel per worker.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish `message` to `exchange` with `routing_key`
    ///
    /// Delivery-side properties (`consumer_queue`, `received_exchange`,
    /// `received_routing_key`) are not part of the published message.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError>;
}
