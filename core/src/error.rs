//! Error types for broker collaborators

use thiserror::Error;

/// Error returned by broker collaborators
///
/// Every failure of a declare or publish call is reported with one of these
/// variants. holdback never retries a failed broker call itself: the error is
/// handed back to whoever invoked the topology builder or the recovery router.
///
/// # Example
///
/// ```
/// use holdback_core::BrokerError;
///
/// fn publish() -> Result<(), BrokerError> {
///     Err(BrokerError::Unavailable("connection reset".to_string()))
/// }
///
/// match publish() {
///     Ok(()) => println!("published"),
///     Err(BrokerError::Unavailable(msg)) => println!("broker down: {}", msg),
///     Err(e) => println!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached
    ///
    /// Examples: connection refused, channel closed, heartbeat timeout.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// Declaring a queue failed
    #[error("failed to declare queue '{queue}': {reason}")]
    Declare {
        /// Queue being declared
        queue: String,
        /// Broker-reported reason
        reason: String,
    },

    /// A queue already exists with different arguments
    ///
    /// Brokers refuse to re-declare a queue whose durability, type or
    /// dead-letter arguments differ from the existing one.
    #[error("queue '{queue}' exists with different arguments: {reason}")]
    PreconditionFailed {
        /// Queue being re-declared
        queue: String,
        /// Which argument differs
        reason: String,
    },

    /// Publishing a message failed
    #[error("failed to publish to '{routing_key}': {reason}")]
    Publish {
        /// Routing key of the failed publish
        routing_key: String,
        /// Broker-reported reason
        reason: String,
    },

    /// No queue is bound for the exchange and routing key
    #[error("unroutable message: exchange '{exchange}', routing key '{routing_key}'")]
    Unroutable {
        /// Target exchange
        exchange: String,
        /// Routing key with no bound queue
        routing_key: String,
    },
}

impl BrokerError {
    /// True when the failure means the broker itself is unreachable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_))
    }
}
