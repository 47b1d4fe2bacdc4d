//! Convenience re-exports for consumer authors.
//!
//! ```rust
//! use holdback_runtime::prelude::*;
//! ```

// Core types
pub use holdback_core::{
    BrokerAdmin, BrokerError, BrokerPublisher, DeathReason, DeathRecord, HeaderValue, Message,
    MessageProperties, QueueSpec,
};

// Retry schedule
pub use holdback_retry::{DelaySchedule, RetryPolicy};

// Topology
pub use holdback_retry::{QueueTopology, QueueTopologyBuilder};

// Recovery
pub use holdback_retry::{
    Cause, Disposition, MessageHandler, MessageRecoverer, RecoveryOutcome, RecoveryRouter,
    RepublishRecoverer, RetryInterceptor, Route,
};

// Brokers
#[cfg(feature = "amqp")]
pub use holdback_retry::AmqpBroker;
pub use holdback_retry::MemoryBroker;

// Configuration
pub use holdback_retry::{ConsumerSettings, LogFormat, RetryConfig};

// Error types
pub use holdback_retry::RetryError;

// Zero-copy payload
pub use bytes::Bytes;

// Shared ownership for brokers and routers
pub use std::sync::Arc;

// Runtime
pub use crate::{Runtime, RuntimeBuilder};
