//! Republishing recoverer
//!
//! A [`RepublishRecoverer`] sends a failed message to a destination computed
//! from the message itself. holdback uses two of them, one per destination:
//!
//! - retry: `("", "retry." + consumer_queue)`
//! - dead-letter: `("", "dlq." + consumer_queue)`
//!
//! The consumer queue is read when the message is recovered, so one pair of
//! recoverers serves every logical queue.

use crate::error::{Result, RetryError};
use async_trait::async_trait;
use holdback_core::headers::{X_EXCEPTION_MESSAGE, X_ORIGINAL_EXCHANGE, X_ORIGINAL_ROUTING_KEY};
use holdback_core::{
    BrokerPublisher, DEFAULT_EXCHANGE, DLQ_QUEUE_PREFIX, Message, RETRY_QUEUE_PREFIX,
};
use std::fmt;
use std::sync::Arc;

/// Failure handed to recovery by the dispatch loop
pub type Cause = dyn std::error::Error + Send + Sync + 'static;

/// Where a message is republished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Target exchange
    pub exchange: String,
    /// Routing key
    pub routing_key: String,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -> '{}'", self.exchange, self.routing_key)
    }
}

/// Computes a [`Route`] from a message, `None` when it cannot
pub type RouteFn = Arc<dyn Fn(&Message) -> Option<Route> + Send + Sync>;

/// Route to `<prefix><consumer_queue>` on the default exchange
pub fn prefixed_route(prefix: &'static str) -> RouteFn {
    Arc::new(move |message: &Message| {
        let queue = message.properties.consumer_queue.as_deref()?;
        Some(Route {
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key: format!("{prefix}{queue}"),
        })
    })
}

/// Route to the message's retry queue
pub fn retry_route() -> RouteFn {
    prefixed_route(RETRY_QUEUE_PREFIX)
}

/// Route to the message's dead-letter queue
pub fn dead_letter_route() -> RouteFn {
    prefixed_route(DLQ_QUEUE_PREFIX)
}

/// One recovery destination
///
/// Implementations must be `Send + Sync`; recovery runs concurrently for
/// many in-flight messages.
#[async_trait]
pub trait MessageRecoverer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Deliver `message` to this destination and report where it went
    async fn recover(&self, message: &Message, cause: &Cause) -> Result<Route>;
}

/// Recoverer that republishes through a [`BrokerPublisher`]
///
/// Adds the recovery bookkeeping headers (`x-exception-message`,
/// `x-original-exchange`, `x-original-routing-key`) and otherwise leaves the
/// message as it was handed in.
pub struct RepublishRecoverer {
    name: &'static str,
    publisher: Arc<dyn BrokerPublisher>,
    route: RouteFn,
}

impl RepublishRecoverer {
    /// Create a recoverer with a custom route
    pub fn new(name: &'static str, publisher: Arc<dyn BrokerPublisher>, route: RouteFn) -> Self {
        Self {
            name,
            publisher,
            route,
        }
    }

    /// Recoverer for `retry.<consumer_queue>`
    pub fn retry(publisher: Arc<dyn BrokerPublisher>) -> Self {
        Self::new("retry", publisher, retry_route())
    }

    /// Recoverer for `dlq.<consumer_queue>`
    pub fn dead_letter(publisher: Arc<dyn BrokerPublisher>) -> Self {
        Self::new("dead_letter", publisher, dead_letter_route())
    }
}

#[async_trait]
impl MessageRecoverer for RepublishRecoverer {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn recover(&self, message: &Message, cause: &Cause) -> Result<Route> {
        let route = (self.route)(message).ok_or(RetryError::MissingConsumerQueue)?;
        let outgoing = with_bookkeeping(message, cause);

        self.publisher
            .publish(&route.exchange, &route.routing_key, &outgoing)
            .await?;
        Ok(route)
    }
}

/// Copy of `message` carrying the recovery bookkeeping headers
fn with_bookkeeping(message: &Message, cause: &Cause) -> Message {
    let mut outgoing = message.clone();
    let headers = &mut outgoing.properties.headers;

    headers.insert(X_EXCEPTION_MESSAGE.to_string(), cause.to_string().into());
    if let Some(exchange) = &message.properties.received_exchange {
        headers.insert(X_ORIGINAL_EXCHANGE.to_string(), exchange.as_str().into());
    }
    if let Some(key) = &message.properties.received_routing_key {
        headers.insert(X_ORIGINAL_ROUTING_KEY.to_string(), key.as_str().into());
    }
    outgoing
}
