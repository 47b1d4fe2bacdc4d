//! AMQP 0-9-1 adapter over a lapin channel

use async_trait::async_trait;
use bytes::Bytes;
use holdback_core::queue::{QUORUM_QUEUE_TYPE, X_QUEUE_TYPE};
use holdback_core::{
    BrokerAdmin, BrokerError, BrokerPublisher, HeaderValue, Headers, Message, MessageProperties,
    QueueSpec,
};
use lapin::message::Delivery;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, ByteArray, FieldArray, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel};

/// [`BrokerAdmin`] and [`BrokerPublisher`] on one lapin channel
///
/// Publishes wait for the broker's confirm when the channel is in confirm
/// mode (see [`AmqpBroker::with_confirms`]); a nack is reported as
/// [`BrokerError::Publish`].
#[derive(Clone)]
pub struct AmqpBroker {
    channel: Channel,
}

impl AmqpBroker {
    /// Wrap a channel as is
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Put the channel in publisher-confirm mode and wrap it
    pub async fn with_confirms(channel: Channel) -> Result<Self, BrokerError> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| unavailable(&e))?;
        Ok(Self::new(channel))
    }

    /// The wrapped channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

#[async_trait]
impl BrokerAdmin for AmqpBroker {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&spec.name, options, queue_arguments(spec))
            .await
            .map_err(|e| declare_error(&spec.name, &e))?;
        Ok(())
    }
}

#[async_trait]
impl BrokerPublisher for AmqpBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError> {
        let publish_error = |reason: String| BrokerError::Publish {
            routing_key: routing_key.to_string(),
            reason,
        };

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &message.payload,
                properties_to_amqp(&message.properties),
            )
            .await
            .map_err(|e| publish_failure(&e, publish_error))?;

        let confirmation = confirm
            .await
            .map_err(|e| publish_failure(&e, publish_error))?;
        if confirmation.is_nack() {
            return Err(publish_error("broker nacked the publish".to_string()));
        }
        Ok(())
    }
}

/// Queue arguments as sent on `queue.declare`
pub fn queue_arguments(spec: &QueueSpec) -> FieldTable {
    let mut arguments = FieldTable::default();
    for (key, value) in &spec.arguments {
        arguments.insert(
            ShortString::from(key.as_str()),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }
    if spec.quorum {
        arguments.insert(
            ShortString::from(X_QUEUE_TYPE),
            AMQPValue::LongString(LongString::from(QUORUM_QUEUE_TYPE)),
        );
    }
    arguments
}

fn is_connection_loss(e: &lapin::Error) -> bool {
    matches!(
        e,
        lapin::Error::IOError(_)
            | lapin::Error::InvalidChannelState(_)
            | lapin::Error::InvalidConnectionState(_)
    )
}

fn unavailable(e: &lapin::Error) -> BrokerError {
    BrokerError::Unavailable(e.to_string())
}

fn declare_error(queue: &str, e: &lapin::Error) -> BrokerError {
    let reason = e.to_string();
    if reason.contains("PRECONDITION_FAILED") {
        BrokerError::PreconditionFailed {
            queue: queue.to_string(),
            reason,
        }
    } else if is_connection_loss(e) {
        unavailable(e)
    } else {
        BrokerError::Declare {
            queue: queue.to_string(),
            reason,
        }
    }
}

fn publish_failure<F>(e: &lapin::Error, publish_error: F) -> BrokerError
where
    F: Fn(String) -> BrokerError,
{
    if is_connection_loss(e) {
        unavailable(e)
    } else {
        publish_error(e.to_string())
    }
}

/// Outgoing AMQP properties
///
/// Delivery-side fields (`consumer_queue`, `received_*`) are not sent.
pub fn properties_to_amqp(properties: &MessageProperties) -> BasicProperties {
    let mut amqp = BasicProperties::default();
    if let Some(content_type) = &properties.content_type {
        amqp = amqp.with_content_type(content_type.as_str().into());
    }
    if let Some(id) = &properties.message_id {
        amqp = amqp.with_message_id(id.as_str().into());
    }
    if let Some(id) = &properties.correlation_id {
        amqp = amqp.with_correlation_id(id.as_str().into());
    }
    if let Some(expiration) = &properties.expiration {
        amqp = amqp.with_expiration(expiration.as_str().into());
    }
    if let Some(mode) = properties.delivery_mode {
        amqp = amqp.with_delivery_mode(mode);
    }
    if !properties.headers.is_empty() {
        amqp = amqp.with_headers(headers_to_table(&properties.headers));
    }
    amqp
}

/// Build a [`Message`] from a delivery consumed off `queue`
pub fn message_from_delivery(delivery: &Delivery, queue: &str) -> Message {
    let amqp = &delivery.properties;
    let text = |value: &Option<ShortString>| value.as_ref().map(|s| s.as_str().to_string());

    Message {
        payload: Bytes::copy_from_slice(&delivery.data),
        properties: MessageProperties {
            content_type: text(amqp.content_type()),
            message_id: text(amqp.message_id()),
            correlation_id: text(amqp.correlation_id()),
            expiration: text(amqp.expiration()),
            delivery_mode: *amqp.delivery_mode(),
            headers: amqp
                .headers()
                .as_ref()
                .map(table_to_headers)
                .unwrap_or_default(),
            consumer_queue: Some(queue.to_string()),
            received_exchange: Some(delivery.exchange.as_str().to_string()),
            received_routing_key: Some(delivery.routing_key.as_str().to_string()),
        },
    }
}

/// Encode headers as an AMQP field table
pub fn headers_to_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(ShortString::from(key.as_str()), value_to_amqp(value));
    }
    table
}

/// Decode an AMQP field table
pub fn table_to_headers(table: &FieldTable) -> Headers {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), value_from_amqp(value)))
        .collect()
}

fn value_to_amqp(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
        HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
        HeaderValue::Float(f) => AMQPValue::Double(*f),
        HeaderValue::Str(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        HeaderValue::Bytes(b) => AMQPValue::ByteArray(ByteArray::from(b.to_vec())),
        HeaderValue::Timestamp(t) => AMQPValue::Timestamp(*t),
        HeaderValue::Array(items) => AMQPValue::FieldArray(FieldArray::from(
            items.iter().map(value_to_amqp).collect::<Vec<_>>(),
        )),
        HeaderValue::Table(table) => AMQPValue::FieldTable(headers_to_table(table)),
        HeaderValue::Void => AMQPValue::Void,
    }
}

fn value_from_amqp(value: &AMQPValue) -> HeaderValue {
    match value {
        AMQPValue::Boolean(b) => HeaderValue::Bool(*b),
        AMQPValue::ShortShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongLongInt(i) => HeaderValue::Int(*i),
        AMQPValue::Float(f) => HeaderValue::Float(f64::from(*f)),
        AMQPValue::Double(f) => HeaderValue::Float(*f),
        AMQPValue::ShortString(s) => HeaderValue::Str(s.as_str().to_string()),
        AMQPValue::LongString(s) => match std::str::from_utf8(s.as_bytes()) {
            Ok(text) => HeaderValue::Str(text.to_string()),
            Err(_) => HeaderValue::Bytes(Bytes::copy_from_slice(s.as_bytes())),
        },
        AMQPValue::ByteArray(b) => HeaderValue::Bytes(Bytes::copy_from_slice(b.as_slice())),
        AMQPValue::Timestamp(t) => HeaderValue::Timestamp(*t),
        AMQPValue::FieldArray(items) => {
            HeaderValue::Array(items.as_slice().iter().map(value_from_amqp).collect())
        }
        AMQPValue::FieldTable(table) => HeaderValue::Table(table_to_headers(table)),
        AMQPValue::DecimalValue(d) => {
            HeaderValue::Float(f64::from(d.value) / 10f64.powi(i32::from(d.scale)))
        }
        AMQPValue::Void => HeaderValue::Void,
    }
}
