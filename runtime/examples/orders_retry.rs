//! Delayed retry against the in-memory broker.
//!
//! A handler that fails twice then succeeds, and one that never succeeds,
//! walked through the retry cycle by hand.
//!
//! ```bash
//! cargo run -p holdback-runtime --example orders_retry
//! ```

use async_trait::async_trait;
use holdback_runtime::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Fails until it has seen `failures` deliveries
struct FlakyInventory {
    failures: u32,
    seen: AtomicU32,
}

#[async_trait]
impl MessageHandler for FlakyInventory {
    async fn handle(&self, message: &Message) -> Result<(), Box<Cause>> {
        let seen = self.seen.fetch_add(1, Ordering::SeqCst);
        if seen < self.failures {
            return Err(format!("inventory service timeout (delivery {})", seen + 1).into());
        }
        tracing::info!(order = ?message.payload_str(), "order reserved");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());

    let runtime = RuntimeBuilder::new()
        .config(RetryConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 8000,
            max_retry_attempts: 3,
            ..RetryConfig::default()
        })
        .queue("orders")
        .start(broker.clone(), broker.clone())
        .await?;

    let handlers = [
        ("order-1", FlakyInventory { failures: 2, seen: AtomicU32::new(0) }),
        ("order-2", FlakyInventory { failures: u32::MAX, seen: AtomicU32::new(0) }),
    ];

    for (body, handler) in &handlers {
        broker
            .publish("", "orders", &Message::new(Bytes::from(*body)))
            .await?;

        while let Some(delivery) = broker.pop("orders") {
            match runtime.dispatch(&delivery, handler).await? {
                Disposition::Acked => println!("{body}: acked"),
                Disposition::Recovered(RecoveryOutcome::Retried { delay, attempt, .. }) => {
                    println!("{body}: attempt {attempt} failed, retrying in {delay:?}");
                    // the broker would wait out the TTL here
                    broker.expire("retry.orders");
                }
                Disposition::Recovered(RecoveryOutcome::DeadLettered { attempt, .. }) => {
                    println!("{body}: gave up after {attempt} retries, parked in dlq.orders");
                }
            }
        }
    }

    println!("dlq.orders depth: {}", broker.depth("dlq.orders"));
    Ok(())
}
