//! Three-queue retry topology
//!
//! For a logical queue `orders` the builder declares:
//!
//! ```text
//!                      publish("", "retry.orders", ttl=delay)
//!   RecoveryRouter ──────────────────────────────► retry.orders
//!         ▲                                             │ ttl expiry
//!         │ handler fails                               │ dlx "" / dlrk "orders"
//!         │                                             ▼
//!      consumer ◄──────────────────────────────────── orders
//!                                                       │ bare reject
//!   RecoveryRouter ──publish("", "dlq.orders")──┐       │ dlx "" / dlrk "dlq.orders"
//!                                               ▼       ▼
//!                                              dlq.orders (terminal)
//! ```
//!
//! The primary queue's own dead-letter wiring only fires for failures that
//! bypass the recovery router, such as a plain reject without requeue.

use crate::error::{Result, RetryError};
use crate::metrics::Metrics;
use holdback_core::{
    BrokerAdmin, DEFAULT_EXCHANGE, QueueSpec, dlq_queue_name, retry_queue_name,
};
use std::sync::Arc;
use tracing::{debug, info};

/// The three queues declared for one logical queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    /// Application-facing queue name
    pub logical_name: String,
    /// `retry.<name>`, dead-letters into the primary queue on expiry
    pub retry: QueueSpec,
    /// `<name>`, dead-letters into the dead-letter queue on bare reject
    pub primary: QueueSpec,
    /// `dlq.<name>`, terminal
    pub dead_letter: QueueSpec,
}

impl QueueTopology {
    /// Describe the topology for a logical queue without declaring anything
    pub fn for_queue(logical_name: &str) -> Self {
        let retry_name = retry_queue_name(logical_name);
        let dlq_name = dlq_queue_name(logical_name);

        Self {
            logical_name: logical_name.to_string(),
            retry: QueueSpec::durable_quorum(retry_name)
                .with_dead_letter(DEFAULT_EXCHANGE, logical_name),
            primary: QueueSpec::durable_quorum(logical_name)
                .with_dead_letter(DEFAULT_EXCHANGE, &dlq_name),
            dead_letter: QueueSpec::durable_quorum(dlq_name),
        }
    }

    /// Queue specs in declaration order: retry, primary, dead-letter
    pub fn specs(&self) -> [&QueueSpec; 3] {
        [&self.retry, &self.primary, &self.dead_letter]
    }
}

/// Declares retry topologies through a [`BrokerAdmin`]
///
/// Declaration is idempotent as long as the broker treats re-declaring an
/// identical queue as a no-op. A failing declare is returned as is; queues
/// declared before the failure are left in place.
pub struct QueueTopologyBuilder {
    admin: Arc<dyn BrokerAdmin>,
}

impl QueueTopologyBuilder {
    /// Create a builder over a broker admin
    pub fn new(admin: Arc<dyn BrokerAdmin>) -> Self {
        Self { admin }
    }

    /// Declare `retry.<name>`, `<name>` and `dlq.<name>`
    pub async fn declare_topology(&self, logical_name: &str) -> Result<QueueTopology> {
        if logical_name.trim().is_empty() {
            return Err(RetryError::Config(
                "logical queue name must not be empty".to_string(),
            ));
        }

        let topology = QueueTopology::for_queue(logical_name);
        for spec in topology.specs() {
            debug!(
                queue = %spec.name,
                arguments = ?spec.arguments,
                "declaring queue"
            );
            self.admin.declare_queue(spec).await?;
        }

        if let Some(m) = Metrics::get() {
            m.record_topology_declared();
        }
        info!(
            queue = %topology.logical_name,
            retry_queue = %topology.retry.name,
            dead_letter_queue = %topology.dead_letter.name,
            "retry topology declared"
        );
        Ok(topology)
    }

    /// Declare several topologies in order, stopping at the first failure
    pub async fn declare_all<I, S>(&self, logical_names: I) -> Result<Vec<QueueTopology>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut declared = Vec::new();
        for name in logical_names {
            declared.push(self.declare_topology(name.as_ref()).await?);
        }
        Ok(declared)
    }
}
