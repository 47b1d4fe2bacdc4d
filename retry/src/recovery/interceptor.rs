//! Retry interceptor
//!
//! Wraps a consumer's message handler: success acknowledges the delivery,
//! failure hands the message to the [`RecoveryRouter`]. Once recovery has
//! republished the message the original delivery is acknowledged as well,
//! so a failed message never stays on the primary queue.

use crate::error::Result;
use crate::recovery::republish::Cause;
use crate::recovery::router::{RecoveryOutcome, RecoveryRouter};
use async_trait::async_trait;
use holdback_core::Message;
use std::sync::Arc;

/// Application message handler
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery
    async fn handle(&self, message: &Message) -> std::result::Result<(), Box<Cause>>;
}

/// What happened to a delivery that went through the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded
    Acked,
    /// Handler failed and the message was republished
    Recovered(RecoveryOutcome),
}

impl Disposition {
    /// The recovery outcome, if the handler failed
    pub fn outcome(&self) -> Option<&RecoveryOutcome> {
        match self {
            Disposition::Acked => None,
            Disposition::Recovered(outcome) => Some(outcome),
        }
    }
}

/// Applies recovery to every handler failure
#[derive(Clone)]
pub struct RetryInterceptor {
    router: Arc<RecoveryRouter>,
}

impl RetryInterceptor {
    /// Create an interceptor over a shared router
    pub fn new(router: Arc<RecoveryRouter>) -> Self {
        Self { router }
    }

    /// The router failures are sent to
    pub fn router(&self) -> &RecoveryRouter {
        &self.router
    }

    /// Run `handler` on `message`, recovering on failure
    ///
    /// An `Err` means the republish itself failed. The caller should then
    /// leave the delivery unacknowledged (or nack it with requeue) so the
    /// broker redelivers it.
    pub async fn invoke(
        &self,
        message: &Message,
        handler: &dyn MessageHandler,
    ) -> Result<Disposition> {
        match handler.handle(message).await {
            Ok(()) => Ok(Disposition::Acked),
            Err(cause) => {
                tracing::debug!(
                    queue = ?message.properties.consumer_queue,
                    error = %cause,
                    "handler failed, recovering message"
                );
                let outcome = self.router.recover(message, &*cause).await?;
                Ok(Disposition::Recovered(outcome))
            }
        }
    }
}
