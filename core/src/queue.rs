//! Queue naming conventions and declaration records
//!
//! Every logical queue owns two satellite queues whose names are part of the
//! wire contract with the broker:
//!
//! ```text
//! retry.<name> ──(ttl expiry)──► <name> ──(bare reject)──► dlq.<name>
//! ```
//!
//! All republishing goes through the default (unnamed) exchange, which routes
//! by queue name.

use std::collections::BTreeMap;

/// Prefix of the holding queue that delays a retry
pub const RETRY_QUEUE_PREFIX: &str = "retry.";

/// Prefix of the terminal dead-letter queue
pub const DLQ_QUEUE_PREFIX: &str = "dlq.";

/// The default exchange; routes a message to the queue named by its routing key
pub const DEFAULT_EXCHANGE: &str = "";

/// Queue argument naming the exchange that receives dead-lettered messages
pub const X_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Queue argument naming the routing key used for dead-lettered messages
pub const X_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Queue argument selecting the queue type
pub const X_QUEUE_TYPE: &str = "x-queue-type";

/// Value of [`X_QUEUE_TYPE`] for replicated quorum queues
pub const QUORUM_QUEUE_TYPE: &str = "quorum";

/// Name of the retry queue for a logical queue
#[inline]
pub fn retry_queue_name(logical: &str) -> String {
    format!("{RETRY_QUEUE_PREFIX}{logical}")
}

/// Name of the dead-letter queue for a logical queue
#[inline]
pub fn dlq_queue_name(logical: &str) -> String {
    format!("{DLQ_QUEUE_PREFIX}{logical}")
}

/// Declaration record handed to a [`BrokerAdmin`](crate::BrokerAdmin)
///
/// `arguments` holds the `x-*` queue arguments. Quorum replication is carried
/// as a flag rather than an argument so that adapters can express it however
/// their broker client expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name
    pub name: String,
    /// Survives broker restarts
    pub durable: bool,
    /// Replicated quorum queue
    pub quorum: bool,
    /// Queue arguments (`x-dead-letter-exchange`, `x-dead-letter-routing-key`)
    pub arguments: BTreeMap<String, String>,
}

impl QueueSpec {
    /// A durable quorum queue with no arguments
    pub fn durable_quorum(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            quorum: true,
            arguments: BTreeMap::new(),
        }
    }

    /// Route rejected and expired messages to `routing_key` on `exchange`
    pub fn with_dead_letter(mut self, exchange: &str, routing_key: &str) -> Self {
        self.arguments
            .insert(X_DEAD_LETTER_EXCHANGE.to_string(), exchange.to_string());
        self.arguments
            .insert(X_DEAD_LETTER_ROUTING_KEY.to_string(), routing_key.to_string());
        self
    }

    /// Dead-letter exchange, if configured
    pub fn dead_letter_exchange(&self) -> Option<&str> {
        self.arguments.get(X_DEAD_LETTER_EXCHANGE).map(String::as_str)
    }

    /// Dead-letter routing key, if configured
    pub fn dead_letter_routing_key(&self) -> Option<&str> {
        self.arguments
            .get(X_DEAD_LETTER_ROUTING_KEY)
            .map(String::as_str)
    }
}
