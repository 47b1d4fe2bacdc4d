//! Configuration for holdback

use crate::error::{Result, RetryError};
use crate::schedule::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration for holdback
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Upper bound of the consumer pool
    pub max_concurrent_consumers: u16,

    /// Consumers started per queue
    pub concurrent_consumers: u16,

    /// Unacknowledged deliveries per consumer
    pub prefetch_count: u16,

    /// First retry delay in milliseconds
    pub initial_delay_ms: u64,

    /// Cap on any retry delay in milliseconds
    pub max_delay_ms: u64,

    /// Retries before a message is dead-lettered
    pub max_retry_attempts: u32,

    /// Delay growth factor between attempts
    pub multiplier: f64,

    /// Logical queues to declare topologies for
    pub queues: Vec<String>,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable
    Pretty,
}

/// Listener container settings derived from [`RetryConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Upper bound of the consumer pool
    pub max_concurrent_consumers: u16,
    /// Consumers started per queue
    pub concurrent_consumers: u16,
    /// Unacknowledged deliveries per consumer
    pub prefetch_count: u16,
    /// Whether a rejected delivery goes back on its queue
    pub default_requeue_rejected: bool,
    /// Whether a missing queue stops the consumer
    pub missing_queues_fatal: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_consumers: 10,
            concurrent_consumers: 1,
            prefetch_count: 250,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_retry_attempts: 3,
            multiplier: 2.0,
            queues: Vec::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl RetryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    ///
    /// Unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RetryConfig::default();

        if let Some(v) = parsed(&lookup, "HOLDBACK_MAX_CONCURRENT_CONSUMERS")? {
            config.max_concurrent_consumers = v;
        }
        if let Some(v) = parsed(&lookup, "HOLDBACK_CONCURRENT_CONSUMERS")? {
            config.concurrent_consumers = v;
        }
        if let Some(v) = parsed(&lookup, "HOLDBACK_PREFETCH_COUNT")? {
            config.prefetch_count = v;
        }
        if let Some(v) = parsed(&lookup, "HOLDBACK_INITIAL_DELAY_MS")? {
            config.initial_delay_ms = v;
        }
        if let Some(v) = parsed(&lookup, "HOLDBACK_MAX_DELAY_MS")? {
            config.max_delay_ms = v;
        }
        if let Some(v) = parsed(&lookup, "HOLDBACK_MAX_RETRY_ATTEMPTS")? {
            config.max_retry_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "HOLDBACK_MULTIPLIER")? {
            config.multiplier = v;
        }

        if let Some(queues) = lookup("HOLDBACK_QUEUES") {
            config.queues = queues
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(level) = lookup("HOLDBACK_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("HOLDBACK_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(RetryError::Config(format!(
                        "invalid HOLDBACK_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Check consumer pool sizing and the retry policy
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_consumers == 0 {
            return Err(RetryError::Config(
                "max_concurrent_consumers must be at least 1".to_string(),
            ));
        }
        if self.concurrent_consumers == 0 {
            return Err(RetryError::Config(
                "concurrent_consumers must be at least 1".to_string(),
            ));
        }
        if self.concurrent_consumers > self.max_concurrent_consumers {
            return Err(RetryError::Config(format!(
                "concurrent_consumers ({}) exceeds max_concurrent_consumers ({})",
                self.concurrent_consumers, self.max_concurrent_consumers
            )));
        }
        if self.prefetch_count == 0 {
            return Err(RetryError::Config(
                "prefetch_count must be at least 1".to_string(),
            ));
        }
        self.policy().map(|_| ())
    }

    /// Retry policy described by this configuration
    pub fn policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            self.multiplier,
            Duration::from_millis(self.max_delay_ms),
            self.max_retry_attempts,
        )
    }

    /// Listener container settings
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            max_concurrent_consumers: self.max_concurrent_consumers,
            concurrent_consumers: self.concurrent_consumers,
            prefetch_count: self.prefetch_count,
            default_requeue_rejected: false,
            missing_queues_fatal: false,
        }
    }
}

/// Parse `key` if set, naming the variable on failure
fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| RetryError::Config(format!("invalid {key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_concurrent_consumers, 10);
        assert_eq!(config.concurrent_consumers, 1);
        assert_eq!(config.prefetch_count, 250);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_lookup_keeps_defaults() {
        let config = RetryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RetryConfig::default());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = RetryConfig::from_lookup(lookup(&[
            ("HOLDBACK_CONCURRENT_CONSUMERS", "4"),
            ("HOLDBACK_PREFETCH_COUNT", " 50 "),
            ("HOLDBACK_INITIAL_DELAY_MS", "500"),
            ("HOLDBACK_MAX_DELAY_MS", "8000"),
            ("HOLDBACK_MAX_RETRY_ATTEMPTS", "5"),
            ("HOLDBACK_MULTIPLIER", "3"),
            ("HOLDBACK_QUEUES", "orders, payments,,invoices "),
            ("HOLDBACK_LOG_LEVEL", "debug"),
            ("HOLDBACK_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.concurrent_consumers, 4);
        assert_eq!(config.prefetch_count, 50);
        assert_eq!(config.multiplier, 3.0);
        assert_eq!(config.queues, vec!["orders", "payments", "invoices"]);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);

        let policy = config.policy().unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_millis(8000));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_parse_failure_names_variable() {
        let err = RetryConfig::from_lookup(lookup(&[("HOLDBACK_PREFETCH_COUNT", "lots")]))
            .unwrap_err();
        assert!(matches!(&err, RetryError::Config(msg) if msg.contains("HOLDBACK_PREFETCH_COUNT")));

        let err = RetryConfig::from_lookup(lookup(&[("HOLDBACK_LOG_FORMAT", "xml")])).unwrap_err();
        assert!(err.to_string().contains("HOLDBACK_LOG_FORMAT"));
    }

    #[test]
    fn test_validate_pool_sizing() {
        let config = RetryConfig {
            concurrent_consumers: 11,
            ..RetryConfig::default()
        };
        assert!(matches!(config.validate(), Err(RetryError::Config(_))));

        let config = RetryConfig {
            concurrent_consumers: 0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            prefetch_count: 0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let config = RetryConfig {
            multiplier: 0.0,
            ..RetryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RetryError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_consumer_settings() {
        let settings = RetryConfig::default().consumer_settings();
        assert_eq!(
            settings,
            ConsumerSettings {
                max_concurrent_consumers: 10,
                concurrent_consumers: 1,
                prefetch_count: 250,
                default_requeue_rejected: false,
                missing_queues_fatal: false,
            }
        );
    }
}
