//! Recovery router
//!
//! Decides, per failed message, between a delayed retry and the dead-letter
//! queue, based on how many times the broker has already cycled the message
//! through its retry queue.
//!
//! ```text
//! DELIVERED ──handler fails──► ROUTING_DECISION
//!     ▲                            │
//!     │ ttl expiry (attempt+1)     ├── can_retry(attempt) ──► RETRY_QUEUED
//!     └────────────────────────────┘
//!                                  └── otherwise ──────────► DEAD_LETTERED
//! ```

use crate::error::Result;
use crate::metrics::Metrics;
use crate::recovery::republish::{Cause, MessageRecoverer, RepublishRecoverer};
use crate::schedule::DelaySchedule;
use holdback_core::{BrokerPublisher, Message};
use std::sync::Arc;
use std::time::Duration;

/// Where a failed message ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Sent to the retry queue with a TTL
    Retried {
        /// Retry queue routing key
        routing_key: String,
        /// TTL set on the message
        delay: Duration,
        /// Attempt count read from the message
        attempt: u64,
    },
    /// Sent to the dead-letter queue
    DeadLettered {
        /// Dead-letter queue routing key
        routing_key: String,
        /// Attempt count read from the message
        attempt: u64,
    },
}

impl RecoveryOutcome {
    /// Routing key the message was republished with
    pub fn routing_key(&self) -> &str {
        match self {
            RecoveryOutcome::Retried { routing_key, .. }
            | RecoveryOutcome::DeadLettered { routing_key, .. } => routing_key,
        }
    }

    /// True for a delayed retry
    pub fn is_retry(&self) -> bool {
        matches!(self, RecoveryOutcome::Retried { .. })
    }
}

/// Routes failed messages to their retry or dead-letter queue
///
/// Immutable after construction and shared across consumer tasks behind an
/// `Arc`.
pub struct RecoveryRouter {
    schedule: Arc<DelaySchedule>,
    retry: Arc<dyn MessageRecoverer>,
    dead_letter: Arc<dyn MessageRecoverer>,
}

impl RecoveryRouter {
    /// Router that republishes through `publisher`
    pub fn new(publisher: Arc<dyn BrokerPublisher>, schedule: Arc<DelaySchedule>) -> Self {
        Self {
            schedule,
            retry: Arc::new(RepublishRecoverer::retry(Arc::clone(&publisher))),
            dead_letter: Arc::new(RepublishRecoverer::dead_letter(publisher)),
        }
    }

    /// Router over arbitrary retry and dead-letter recoverers
    pub fn with_recoverers(
        retry: Arc<dyn MessageRecoverer>,
        dead_letter: Arc<dyn MessageRecoverer>,
        schedule: Arc<DelaySchedule>,
    ) -> Self {
        Self {
            schedule,
            retry,
            dead_letter,
        }
    }

    /// The schedule decisions are made against
    pub fn schedule(&self) -> &DelaySchedule {
        &self.schedule
    }

    /// Attempt count carried by a message
    ///
    /// `count` of the most recent `x-death` record. A missing or malformed
    /// history counts as 0, and so does a negative count.
    pub fn attempt_count(message: &Message) -> u64 {
        message
            .redelivery_count()
            .map(|count| u64::try_from(count).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Route one failed message
    ///
    /// Only a failing republish is reported as an error; exhausting the retry
    /// budget is a normal [`RecoveryOutcome::DeadLettered`].
    pub async fn recover(&self, message: &Message, cause: &Cause) -> Result<RecoveryOutcome> {
        let attempt = Self::attempt_count(message);
        let queue = message
            .properties
            .consumer_queue
            .as_deref()
            .unwrap_or("unknown");

        let result = if self.schedule.can_retry(attempt) {
            self.send_to_retry(message, cause, attempt, queue).await
        } else {
            self.send_to_dead_letter(message, cause, attempt, queue)
                .await
        };

        if let Err(e) = &result {
            if let Some(m) = Metrics::get() {
                m.record_failure(queue);
            }
            tracing::warn!(
                queue = queue,
                attempt = attempt,
                error = %e,
                "failed to republish failed message"
            );
        }
        result
    }

    async fn send_to_retry(
        &self,
        message: &Message,
        cause: &Cause,
        attempt: u64,
        queue: &str,
    ) -> Result<RecoveryOutcome> {
        let delay = self.schedule.delay_for(attempt);
        let mut delayed = message.clone();
        delayed.set_expiration(delay);

        let route = self.retry.recover(&delayed, cause).await?;

        if let Some(m) = Metrics::get() {
            m.record_retried(queue, delay);
        }
        tracing::debug!(
            queue = queue,
            recoverer = self.retry.name(),
            routing_key = %route.routing_key,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "failed message sent to retry queue"
        );

        Ok(RecoveryOutcome::Retried {
            routing_key: route.routing_key,
            delay,
            attempt,
        })
    }

    async fn send_to_dead_letter(
        &self,
        message: &Message,
        cause: &Cause,
        attempt: u64,
        queue: &str,
    ) -> Result<RecoveryOutcome> {
        let route = self.dead_letter.recover(message, cause).await?;

        if let Some(m) = Metrics::get() {
            m.record_dead_lettered(queue);
        }
        tracing::warn!(
            queue = queue,
            recoverer = self.dead_letter.name(),
            routing_key = %route.routing_key,
            attempt = attempt,
            max_attempts = self.schedule.policy().max_attempts,
            error = %cause,
            "retries exhausted, failed message sent to dead letter queue"
        );

        Ok(RecoveryOutcome::DeadLettered {
            routing_key: route.routing_key,
            attempt,
        })
    }
}
