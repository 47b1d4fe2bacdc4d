//! holdback runtime - startup wiring for delayed retry
//!
//! Provides [`run()`] for zero-boilerplate startup, and [`RuntimeBuilder`]
//! for users who need control over configuration, queues, tracing or
//! metrics.
//!
//! # Quick start
//!
//! ```ignore
//! use holdback_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let broker = Arc::new(MemoryBroker::new());
//!     holdback_runtime::run(broker, |runtime| async move {
//!         // start consumers that call runtime.interceptor().invoke(..)
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod prelude;

use holdback_core::{BrokerAdmin, BrokerPublisher, Message};
use holdback_retry::metrics::{self, Metrics};
use holdback_retry::{
    ConsumerSettings, DelaySchedule, Disposition, LogFormat, MessageHandler, QueueTopology,
    QueueTopologyBuilder, RecoveryRouter, RetryConfig, RetryInterceptor,
};
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Start holdback with default settings and run `serve` until shutdown.
///
/// Loads configuration from `HOLDBACK_*` environment variables, initialises
/// tracing and metrics, declares the retry topology for every configured
/// queue, then hands the [`Runtime`] to your closure. Returns when the
/// closure finishes or on SIGINT/SIGTERM, whichever comes first.
pub async fn run<B, F, Fut>(broker: Arc<B>, serve: F) -> anyhow::Result<()>
where
    B: BrokerAdmin + BrokerPublisher + 'static,
    F: FnOnce(Runtime) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    RuntimeBuilder::new().serve(broker, serve).await
}

/// Builder for controlling runtime behaviour.
///
/// # Example
///
/// ```ignore
/// let runtime = RuntimeBuilder::new()
///     .config(RetryConfig { max_retry_attempts: 5, ..RetryConfig::default() })
///     .queue("orders")
///     .without_metrics()
///     .start(broker.clone(), broker)
///     .await?;
/// ```
pub struct RuntimeBuilder {
    config: Option<RetryConfig>,
    queues: Vec<String>,
    tracing_enabled: bool,
    metrics_enabled: bool,
}

impl RuntimeBuilder {
    /// Create a new builder; configuration comes from the environment
    /// unless [`RuntimeBuilder::config`] is called.
    pub fn new() -> Self {
        Self {
            config: None,
            queues: Vec::new(),
            tracing_enabled: true,
            metrics_enabled: true,
        }
    }

    /// Use this configuration instead of reading `HOLDBACK_*`.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Declare the retry topology for one more logical queue.
    ///
    /// Added after the queues named in the configuration; duplicates are
    /// declared once.
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queues.push(name.into());
        self
    }

    /// Leave the global tracing subscriber alone.
    pub fn without_tracing(mut self) -> Self {
        self.tracing_enabled = false;
        self
    }

    /// Do not register prometheus metrics.
    pub fn without_metrics(mut self) -> Self {
        self.metrics_enabled = false;
        self
    }

    /// Initialise everything and declare topologies.
    ///
    /// Fails on invalid configuration, metric registration errors and any
    /// broker error raised while declaring queues.
    pub async fn start(
        self,
        admin: Arc<dyn BrokerAdmin>,
        publisher: Arc<dyn BrokerPublisher>,
    ) -> anyhow::Result<Runtime> {
        // ── 1. Load and validate config ──────────────────────────
        let mut config = match self.config {
            Some(config) => config,
            None => RetryConfig::from_env()?,
        };
        for queue in self.queues {
            if !config.queues.contains(&queue) {
                config.queues.push(queue);
            }
        }
        config.validate()?;

        // ── 2. Init tracing ──────────────────────────────────────
        if self.tracing_enabled {
            init_tracing(&config);
        }

        let policy = config.policy()?;
        info!(
            queues = ?config.queues,
            initial_delay_ms = config.initial_delay_ms,
            max_delay_ms = config.max_delay_ms,
            max_retry_attempts = config.max_retry_attempts,
            multiplier = config.multiplier,
            "Starting holdback"
        );

        // ── 3. Init metrics ──────────────────────────────────────
        if self.metrics_enabled {
            Metrics::init()?;
        }

        // ── 4. Declare retry topologies ──────────────────────────
        let topologies = QueueTopologyBuilder::new(admin)
            .declare_all(&config.queues)
            .await?;

        // ── 5. Wire recovery ─────────────────────────────────────
        let schedule = Arc::new(DelaySchedule::new(policy)?);
        info!(delays = ?schedule.delays(), "Retry schedule ready");
        let router = Arc::new(RecoveryRouter::new(publisher, schedule));

        Ok(Runtime {
            consumer_settings: config.consumer_settings(),
            config,
            topologies,
            interceptor: RetryInterceptor::new(router),
        })
    }

    /// Start, then run `serve` until it returns or a shutdown signal arrives.
    pub async fn serve<B, F, Fut>(self, broker: Arc<B>, serve: F) -> anyhow::Result<()>
    where
        B: BrokerAdmin + BrokerPublisher + 'static,
        F: FnOnce(Runtime) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let runtime = self.start(broker.clone(), broker).await?;

        tokio::select! {
            result = serve(runtime) => result?,
            _ = shutdown_signal() => {}
        }

        info!("holdback shutdown complete");
        Ok(())
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A started holdback instance
#[derive(Clone)]
pub struct Runtime {
    config: RetryConfig,
    consumer_settings: ConsumerSettings,
    topologies: Vec<QueueTopology>,
    interceptor: RetryInterceptor,
}

impl Runtime {
    /// Effective configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Settings consumers should be created with
    pub fn consumer_settings(&self) -> ConsumerSettings {
        self.consumer_settings
    }

    /// Topologies declared at startup, in configuration order
    pub fn topologies(&self) -> &[QueueTopology] {
        &self.topologies
    }

    /// Interceptor to wrap message handlers with
    pub fn interceptor(&self) -> &RetryInterceptor {
        &self.interceptor
    }

    /// Run `handler` on one delivery with retry recovery applied
    pub async fn dispatch(
        &self,
        message: &Message,
        handler: &dyn MessageHandler,
    ) -> holdback_retry::Result<Disposition> {
        self.interceptor.invoke(message, handler).await
    }

    /// Current metrics in Prometheus text format
    pub fn metrics_text(&self) -> String {
        metrics::gather()
    }
}

/// Initialise the tracing subscriber based on config.
///
/// A subscriber installed earlier (by the application or a previous
/// runtime) is kept.
fn init_tracing(config: &RetryConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
