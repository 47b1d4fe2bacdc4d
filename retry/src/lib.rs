//! holdback - Delayed retry for message-queue consumers
//!
//! A failed message is not retried in-process. It is republished to a
//! holding queue with a per-message TTL; when the TTL elapses the broker
//! dead-letters it back onto the primary queue, where it is consumed again.
//! After `max_attempts` cycles it goes to a terminal dead-letter queue.
//!
//! # Topology
//!
//! ```text
//!   retry.orders ──ttl expiry──► orders ──handler fails──► RecoveryRouter
//!        ▲                                                      │
//!        └──────────── attempt < max_attempts ──────────────────┤
//!                                                               │
//!   dlq.orders ◄─────────────── otherwise ──────────────────────┘
//! ```
//!
//! The delay grows geometrically per attempt and is capped; see
//! [`DelaySchedule`]. The attempt number is the broker-maintained `x-death`
//! count, so no retry state lives in the consumer.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod broker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod recovery;
pub mod schedule;
pub mod topology;

#[cfg(feature = "amqp")]
pub use broker::AmqpBroker;
pub use broker::MemoryBroker;
pub use config::{ConsumerSettings, LogFormat, RetryConfig};
pub use error::{Result, RetryError};
pub use metrics::Metrics;
pub use recovery::{
    Cause, Disposition, MessageHandler, MessageRecoverer, RecoveryOutcome, RecoveryRouter,
    RepublishRecoverer, RetryInterceptor, Route,
};
pub use schedule::{DelaySchedule, RetryPolicy, compute_delays};
pub use topology::{QueueTopology, QueueTopologyBuilder};

// Re-export core types for convenience
pub use holdback_core::{
    BrokerAdmin, BrokerError, BrokerPublisher, DeathReason, DeathRecord, HeaderValue, Headers,
    Message, MessageProperties, QueueSpec,
};
