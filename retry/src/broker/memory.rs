//! In-process broker
//!
//! Queues live in a single table behind a mutex. Only the default exchange
//! is supported, which is all the retry topology needs: every publish and
//! every dead-letter hop is a direct route to a queue by name.

use async_trait::async_trait;
use holdback_core::headers::{X_DEATH, death_history, death_history_header};
use holdback_core::{
    BrokerAdmin, BrokerError, BrokerPublisher, DEFAULT_EXCHANGE, DeathReason, DeathRecord,
    Message, QueueSpec,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct QueueState {
    spec: QueueSpec,
    messages: VecDeque<Message>,
}

/// Broker that keeps everything in memory
///
/// Implements [`BrokerAdmin`] and [`BrokerPublisher`] with the semantics the
/// retry cycle relies on: identical re-declares are no-ops, TTL expiry and
/// rejection dead-letter through the queue's `x-dead-letter-*` arguments,
/// and each hop updates the `x-death` history.
///
/// Nothing expires on its own; tests call [`MemoryBroker::expire`] to
/// simulate the TTL elapsing.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, QueueState>>,
    fail_publishes: AtomicBool,
    fail_declares: AtomicBool,
    published: AtomicU64,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail with [`BrokerError::Unavailable`]
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make every declare fail with [`BrokerError::Unavailable`]
    pub fn fail_declares(&self, fail: bool) {
        self.fail_declares.store(fail, Ordering::SeqCst);
    }

    /// Take the head message of a queue
    pub fn pop(&self, queue: &str) -> Option<Message> {
        self.queues.lock().get_mut(queue)?.messages.pop_front()
    }

    /// Copy of the head message of a queue
    pub fn peek(&self, queue: &str) -> Option<Message> {
        self.queues.lock().get(queue)?.messages.front().cloned()
    }

    /// Messages waiting in a queue (0 for unknown queues)
    pub fn depth(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .get(queue)
            .map_or(0, |state| state.messages.len())
    }

    /// Declared queue names, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Spec a queue was declared with
    pub fn spec(&self, queue: &str) -> Option<QueueSpec> {
        self.queues.lock().get(queue).map(|state| state.spec.clone())
    }

    /// Successful publishes so far
    pub fn total_published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Let the TTL of every message with an expiration in `queue` elapse
    ///
    /// Returns how many messages were dead-lettered out of the queue
    /// (including any dropped for lack of a dead-letter target).
    pub fn expire(&self, queue: &str) -> usize {
        let mut queues = self.queues.lock();
        let Some(state) = queues.get_mut(queue) else {
            return 0;
        };

        let (expired, kept): (VecDeque<Message>, VecDeque<Message>) = state
            .messages
            .drain(..)
            .partition(|m| m.properties.expiration.is_some());
        state.messages = kept;
        let spec = state.spec.clone();

        let count = expired.len();
        for message in expired {
            dead_letter(&mut queues, &spec, message, DeathReason::Expired);
        }
        count
    }

    /// Reject the head message of `queue` without requeue
    ///
    /// Returns false when the queue is empty or unknown.
    pub fn reject(&self, queue: &str) -> bool {
        let mut queues = self.queues.lock();
        let Some(state) = queues.get_mut(queue) else {
            return false;
        };
        let Some(message) = state.messages.pop_front() else {
            return false;
        };
        let spec = state.spec.clone();

        dead_letter(&mut queues, &spec, message, DeathReason::Rejected);
        true
    }
}

/// Append a message to a queue, stamping where it was delivered from
fn enqueue(state: &mut QueueState, exchange: &str, routing_key: &str, mut message: Message) {
    message.properties.consumer_queue = Some(state.spec.name.clone());
    message.properties.received_exchange = Some(exchange.to_string());
    message.properties.received_routing_key = Some(routing_key.to_string());
    state.messages.push_back(message);
}

/// Dead-letter `message` out of the queue described by `source`
fn dead_letter(
    queues: &mut HashMap<String, QueueState>,
    source: &QueueSpec,
    mut message: Message,
    reason: DeathReason,
) {
    let original_expiration = message.properties.expiration.take();
    let mut history = death_history(&message.properties.headers).unwrap_or_default();

    let existing = history
        .iter()
        .position(|r| r.queue == source.name && r.reason == reason);
    let record = match existing {
        Some(index) => {
            let mut record = history.remove(index);
            record.count = record.count.saturating_add(1);
            record.original_expiration = original_expiration;
            record
        }
        None => DeathRecord {
            count: 1,
            reason,
            queue: source.name.clone(),
            exchange: message
                .properties
                .received_exchange
                .clone()
                .unwrap_or_default(),
            routing_keys: message
                .properties
                .received_routing_key
                .iter()
                .cloned()
                .collect(),
            original_expiration,
        },
    };
    history.insert(0, record);
    message
        .properties
        .headers
        .insert(X_DEATH.to_string(), death_history_header(&history));

    let Some(exchange) = source.dead_letter_exchange() else {
        tracing::debug!(queue = %source.name, "no dead-letter exchange, message dropped");
        return;
    };
    if exchange != DEFAULT_EXCHANGE {
        tracing::warn!(
            queue = %source.name,
            exchange = exchange,
            "dead-letter exchange not supported in memory, message dropped"
        );
        return;
    }

    let routing_key = source
        .dead_letter_routing_key()
        .map(str::to_string)
        .or_else(|| message.properties.received_routing_key.clone())
        .unwrap_or_default();

    match queues.get_mut(&routing_key) {
        Some(target) => {
            tracing::trace!(from = %source.name, to = %routing_key, "dead-lettered");
            enqueue(target, exchange, &routing_key, message);
        }
        None => {
            tracing::warn!(
                queue = %source.name,
                routing_key = %routing_key,
                "dead-letter target missing, message dropped"
            );
        }
    }
}

#[async_trait]
impl BrokerAdmin for MemoryBroker {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        if self.fail_declares.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker is down".to_string()));
        }

        let mut queues = self.queues.lock();
        match queues.get(&spec.name) {
            Some(existing) if existing.spec == *spec => Ok(()),
            Some(existing) => Err(BrokerError::PreconditionFailed {
                queue: spec.name.clone(),
                reason: format!(
                    "declared with {:?}, requested {:?}",
                    existing.spec.arguments, spec.arguments
                ),
            }),
            None => {
                queues.insert(
                    spec.name.clone(),
                    QueueState {
                        spec: spec.clone(),
                        messages: VecDeque::new(),
                    },
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BrokerPublisher for MemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker is down".to_string()));
        }
        let unroutable = || BrokerError::Unroutable {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if exchange != DEFAULT_EXCHANGE {
            return Err(unroutable());
        }

        let mut queues = self.queues.lock();
        let state = queues.get_mut(routing_key).ok_or_else(unroutable)?;
        enqueue(state, exchange, routing_key, message.clone());
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
