//! Error types for holdback

use thiserror::Error;

// Re-export BrokerError from holdback-core
pub use holdback_core::BrokerError;

/// Result type alias for holdback operations
pub type Result<T> = std::result::Result<T, RetryError>;

/// Main error type for holdback
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Retry policy rejected at construction
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// Broker declare or publish failure, passed through unmodified
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The failed message does not say which queue it was consumed from
    #[error("message has no consumer queue, cannot derive retry or dead-letter route")]
    MissingConsumerQueue,

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl RetryError {
    /// The underlying broker error, if this is one
    pub fn broker(&self) -> Option<&BrokerError> {
        match self {
            RetryError::Broker(e) => Some(e),
            _ => None,
        }
    }
}
