//! Runtime Integration Tests
//!
//! Startup wiring against the in-memory broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use holdback_runtime::prelude::*;

struct Rejects;

#[async_trait]
impl MessageHandler for Rejects {
    async fn handle(&self, _message: &Message) -> Result<(), Box<Cause>> {
        Err("invalid order".into())
    }
}

struct Accepts;

#[async_trait]
impl MessageHandler for Accepts {
    async fn handle(&self, _message: &Message) -> Result<(), Box<Cause>> {
        Ok(())
    }
}

fn config(queues: &[&str]) -> RetryConfig {
    RetryConfig {
        initial_delay_ms: 500,
        max_delay_ms: 4000,
        max_retry_attempts: 2,
        queues: queues.iter().map(|q| q.to_string()).collect(),
        ..RetryConfig::default()
    }
}

#[tokio::test]
async fn test_start_declares_configured_and_added_queues() {
    let broker = Arc::new(MemoryBroker::new());

    let runtime = RuntimeBuilder::new()
        .config(config(&["orders"]))
        .queue("payments")
        .queue("orders")
        .without_tracing()
        .without_metrics()
        .start(broker.clone(), broker.clone())
        .await
        .unwrap();

    let names: Vec<&str> = runtime
        .topologies()
        .iter()
        .map(|t| t.logical_name.as_str())
        .collect();
    assert_eq!(names, vec!["orders", "payments"]);
    assert_eq!(
        broker.queue_names(),
        vec![
            "dlq.orders",
            "dlq.payments",
            "orders",
            "payments",
            "retry.orders",
            "retry.payments"
        ]
    );
    assert_eq!(runtime.config().queues, vec!["orders", "payments"]);
}

#[tokio::test]
async fn test_dispatch_applies_configured_schedule() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = RuntimeBuilder::new()
        .config(config(&["orders"]))
        .without_tracing()
        .without_metrics()
        .start(broker.clone(), broker.clone())
        .await
        .unwrap();

    broker
        .publish("", "orders", &Message::new(Bytes::from_static(b"{}")))
        .await
        .unwrap();
    let delivery = broker.pop("orders").unwrap();

    let disposition = runtime.dispatch(&delivery, &Rejects).await.unwrap();
    assert_eq!(
        disposition,
        Disposition::Recovered(RecoveryOutcome::Retried {
            routing_key: "retry.orders".to_string(),
            delay: std::time::Duration::from_millis(500),
            attempt: 0,
        })
    );

    broker.expire("retry.orders");
    let redelivered = broker.pop("orders").unwrap();
    assert_eq!(
        runtime.dispatch(&redelivered, &Accepts).await.unwrap(),
        Disposition::Acked
    );
    assert_eq!(broker.depth("dlq.orders"), 0);
}

#[tokio::test]
async fn test_consumer_settings_follow_config() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = RuntimeBuilder::new()
        .config(RetryConfig {
            concurrent_consumers: 3,
            prefetch_count: 20,
            ..config(&[])
        })
        .without_tracing()
        .without_metrics()
        .start(broker.clone(), broker)
        .await
        .unwrap();

    let settings = runtime.consumer_settings();
    assert_eq!(settings.concurrent_consumers, 3);
    assert_eq!(settings.prefetch_count, 20);
    assert!(!settings.default_requeue_rejected);
    assert!(!settings.missing_queues_fatal);
    assert!(runtime.topologies().is_empty());
}

#[tokio::test]
async fn test_invalid_config_fails_before_declaring() {
    let broker = Arc::new(MemoryBroker::new());
    let result = RuntimeBuilder::new()
        .config(RetryConfig {
            concurrent_consumers: 50,
            ..config(&["orders"])
        })
        .without_tracing()
        .without_metrics()
        .start(broker.clone(), broker.clone())
        .await;

    let err = result.err().expect("pool sizing should be rejected");
    assert!(err.to_string().contains("concurrent_consumers"));
    assert!(broker.queue_names().is_empty());
}

#[tokio::test]
async fn test_broker_down_fails_start() {
    let broker = Arc::new(MemoryBroker::new());
    broker.fail_declares(true);

    let result = RuntimeBuilder::new()
        .config(config(&["orders"]))
        .without_tracing()
        .without_metrics()
        .start(broker.clone(), broker)
        .await;

    let err = result.err().expect("declare failure should surface");
    let retry_err = err.downcast_ref::<RetryError>().unwrap();
    assert!(retry_err.broker().is_some_and(BrokerError::is_unavailable));
}

#[tokio::test]
async fn test_metrics_text_after_recovery() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = RuntimeBuilder::new()
        .config(RetryConfig {
            max_retry_attempts: 0,
            ..config(&["metered"])
        })
        .without_tracing()
        .start(broker.clone(), broker.clone())
        .await
        .unwrap();

    broker
        .publish("", "metered", &Message::new(Bytes::new()))
        .await
        .unwrap();
    let delivery = broker.pop("metered").unwrap();
    runtime.dispatch(&delivery, &Rejects).await.unwrap();

    let text = runtime.metrics_text();
    assert!(text.contains("holdback_recoveries_total"));
    assert!(text.contains("metered"));
}
