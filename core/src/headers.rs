//! Typed message headers and the broker's redelivery history
//!
//! Broker headers are loosely typed tables. [`HeaderValue`] keeps the shape
//! (scalars, arrays, nested tables) without committing to one client
//! library's encoding, and [`DeathRecord`] is the typed view of one entry of
//! the `x-death` history that the broker appends every time it dead-letters
//! a message.

use bytes::Bytes;
use std::collections::BTreeMap;

/// Broker-maintained redelivery history, most recent record first
pub const X_DEATH: &str = "x-death";

/// Display string of the failure that triggered recovery
pub const X_EXCEPTION_MESSAGE: &str = "x-exception-message";

/// Exchange the failed message was originally delivered from
pub const X_ORIGINAL_EXCHANGE: &str = "x-original-exchange";

/// Routing key the failed message was originally delivered with
pub const X_ORIGINAL_ROUTING_KEY: &str = "x-original-routing-key";

/// Header table
pub type Headers = BTreeMap<String, HeaderValue>;

/// A single header value
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Boolean
    Bool(bool),
    /// Any signed or unsigned integer width, widened
    Int(i64),
    /// Any floating point width, widened
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Opaque bytes
    Bytes(Bytes),
    /// Seconds since the Unix epoch
    Timestamp(u64),
    /// Ordered list
    Array(Vec<HeaderValue>),
    /// Nested table
    Table(Headers),
    /// Explicit null
    Void,
}

impl HeaderValue {
    /// Integer value, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Array items, if this is an array
    pub fn as_array(&self) -> Option<&[HeaderValue]> {
        match self {
            HeaderValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Nested table, if this is a table
    pub fn as_table(&self) -> Option<&Headers> {
        match self {
            HeaderValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Str(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Str(s)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

/// Why the broker dead-lettered a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathReason {
    /// Negatively acknowledged without requeue
    Rejected,
    /// Per-message or per-queue TTL elapsed
    Expired,
    /// Queue length limit exceeded
    MaxLen,
    /// Delivery limit of a quorum queue exceeded
    DeliveryLimit,
    /// Anything this crate does not know about
    Other(String),
}

impl DeathReason {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            DeathReason::Rejected => "rejected",
            DeathReason::Expired => "expired",
            DeathReason::MaxLen => "maxlen",
            DeathReason::DeliveryLimit => "delivery_limit",
            DeathReason::Other(s) => s,
        }
    }

    /// Parse the wire representation
    pub fn parse(s: &str) -> Self {
        match s {
            "rejected" => DeathReason::Rejected,
            "expired" => DeathReason::Expired,
            "maxlen" => DeathReason::MaxLen,
            "delivery_limit" => DeathReason::DeliveryLimit,
            other => DeathReason::Other(other.to_string()),
        }
    }
}

/// One entry of the `x-death` history
///
/// The broker keeps one record per `(queue, reason)` pair and bumps its
/// `count` each time the message is dead-lettered out of that queue for that
/// reason again. The most recently touched record is always first.
#[derive(Debug, Clone, PartialEq)]
pub struct DeathRecord {
    /// How many times the message was dead-lettered for this queue and reason
    pub count: i64,
    /// Why it was dead-lettered
    pub reason: DeathReason,
    /// Queue the message was dead-lettered out of
    pub queue: String,
    /// Exchange the message had been published to
    pub exchange: String,
    /// Routing keys the message had been published with
    pub routing_keys: Vec<String>,
    /// Per-message expiration the message carried before dead-lettering
    pub original_expiration: Option<String>,
}

impl DeathRecord {
    /// Parse one `x-death` entry
    ///
    /// Only `count` is mandatory. Returns `None` when the entry is not a table
    /// or has no integer `count`.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        let table = value.as_table()?;
        let count = table.get("count")?.as_i64()?;
        let text = |key: &str| {
            table
                .get(key)
                .and_then(HeaderValue::as_str)
                .map(str::to_string)
        };

        Some(Self {
            count,
            reason: DeathReason::parse(&text("reason").unwrap_or_default()),
            queue: text("queue").unwrap_or_default(),
            exchange: text("exchange").unwrap_or_default(),
            routing_keys: table
                .get("routing-keys")
                .and_then(HeaderValue::as_array)
                .map(|keys| {
                    keys.iter()
                        .filter_map(HeaderValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            original_expiration: text("original-expiration"),
        })
    }

    /// Encode as an `x-death` entry
    pub fn to_header(&self) -> HeaderValue {
        let mut table = Headers::new();
        table.insert("count".to_string(), HeaderValue::Int(self.count));
        table.insert("reason".to_string(), self.reason.as_str().into());
        table.insert("queue".to_string(), self.queue.as_str().into());
        table.insert("exchange".to_string(), self.exchange.as_str().into());
        table.insert(
            "routing-keys".to_string(),
            HeaderValue::Array(
                self.routing_keys
                    .iter()
                    .map(|k| HeaderValue::from(k.as_str()))
                    .collect(),
            ),
        );
        if let Some(expiration) = &self.original_expiration {
            table.insert(
                "original-expiration".to_string(),
                expiration.as_str().into(),
            );
        }
        HeaderValue::Table(table)
    }
}

/// Parse the whole `x-death` history
///
/// Returns `None` when the header is absent or is not an array. Entries that
/// fail to parse are skipped.
pub fn death_history(headers: &Headers) -> Option<Vec<DeathRecord>> {
    let entries = headers.get(X_DEATH)?.as_array()?;
    Some(entries.iter().filter_map(DeathRecord::from_header).collect())
}

/// Encode a history back into an `x-death` header value
pub fn death_history_header(records: &[DeathRecord]) -> HeaderValue {
    HeaderValue::Array(records.iter().map(DeathRecord::to_header).collect())
}
