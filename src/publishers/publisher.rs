use crate::amqp::topology::Queue;
use crate::codec::{encode, EncodeError, Payload};
use crate::publishers::PublishChannel;
use amq_protocol_types::{FieldTable, ShortString};
use lapin::message::BasicReturnMessage;
use lapin::BasicProperties;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// A high-level interface to publish messages to a [`Queue`].
///
/// Messages are addressed through the queue exchange and routing key when the queue is bound to
/// an exchange with a routing key. Otherwise they go through the default exchange, using the
/// queue name (qualified by the queue name prefix, if any) as routing key.
///
/// Payloads are encoded before anything is sent to the broker: a payload that cannot be encoded
/// (e.g. raw bytes) fails with [`PublisherError::Encode`] and never reaches the broker.
///
/// There is no retry: broker failures are returned to the caller.
///
/// # How do I build a `Publisher`?
///
/// `Publisher` provides a fluent API to add configuration step-by-step, known as
/// "builder pattern" in Rust.
/// The starting point is [`Publisher::builder`].
pub struct Publisher {
    channel: Arc<dyn PublishChannel>,
    queue: Queue,
    queue_name_prefix: Option<String>,
    /// Timeout on publishing.
    timeout: std::time::Duration,
}

impl Publisher {
    /// Start building a [`Publisher`] for `queue`.
    ///
    /// You will need a channel - check out [`ConnectionFactory::new_publisher_channel`].
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use carrot_router::amqp::configuration::RabbitMqSettings;
    /// use carrot_router::amqp::topology::Queue;
    /// use carrot_router::amqp::ConnectionFactory;
    /// use carrot_router::publishers::Publisher;
    ///
    /// pub async fn get_publisher() -> Result<Publisher, anyhow::Error> {
    ///     let settings = RabbitMqSettings::default();
    ///     let connection_factory = ConnectionFactory::new_from_config(&settings)?;
    ///     let channel = connection_factory.new_publisher_channel(true).await?;
    ///
    ///     Ok(Publisher::builder(channel, Queue::new("notifications"))
    ///         .queue_name_prefix("staging")
    ///         .publish_timeout(std::time::Duration::from_secs(3))
    ///         .build())
    /// }
    /// ```
    ///
    /// [`ConnectionFactory::new_publisher_channel`]: crate::amqp::ConnectionFactory::new_publisher_channel
    pub fn builder(channel: impl PublishChannel, queue: Queue) -> PublisherBuilder {
        PublisherBuilder::new(Arc::new(channel), queue)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Encode `payload` and publish it, optionally with `headers`.
    ///
    /// The content type is derived from the payload shape. A `message_id` and a `timestamp`
    /// are added to the message properties.
    #[tracing::instrument(
        skip_all,
        name = "publish_message",
        fields(queue_name = %self.queue.name)
    )]
    pub async fn publish(
        &self,
        payload: impl Into<Payload>,
        headers: Option<FieldTable>,
    ) -> Result<(), PublisherError> {
        let payload = payload.into();
        let body = encode(&payload)?;

        let mut properties = BasicProperties::default();
        if let Some(content_type) = payload.shape().content_type() {
            properties = properties.with_content_type(ShortString::from(content_type));
        }
        if let Some(headers) = headers {
            properties = properties.with_headers(headers);
        }
        let properties = inject_amqp_properties(properties);

        let (exchange, routing_key) = self.queue.publish_target(self.queue_name_prefix.as_deref());
        let publish_future = self
            .channel
            .basic_publish(&exchange, &routing_key, &body, properties);

        match tokio::time::timeout(self.timeout, publish_future).await {
            Ok(result) => result,
            Err(_) => Err(PublisherError::TimeoutError),
        }
    }

    /// Publish a serialisable record as a JSON object, see [`Publisher::publish`].
    pub async fn publish_record<T: Serialize>(
        &self,
        record: &T,
        headers: Option<FieldTable>,
    ) -> Result<(), PublisherError> {
        self.publish(Payload::record(record)?, headers).await
    }
}

/// Error returned when trying to publish a message using `Publisher`.
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("Failed to encode the payload")]
    Encode(#[from] EncodeError),
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] anyhow::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    TimeoutError,
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// A builder for [`Publisher`].
///
/// Use [`Publisher::builder`] as entrypoint.
pub struct PublisherBuilder {
    channel: Arc<dyn PublishChannel>,
    queue: Queue,
    queue_name_prefix: Option<String>,
    timeout: std::time::Duration,
}

impl PublisherBuilder {
    fn new(channel: Arc<dyn PublishChannel>, queue: Queue) -> Self {
        Self {
            channel,
            queue,
            queue_name_prefix: None,
            timeout: std::time::Duration::from_secs(3),
        }
    }

    /// The prefix of the consumer group owning the queue.
    ///
    /// It only affects queues published to through the default exchange, see
    /// [`Queue::publish_target`].
    #[must_use]
    pub fn queue_name_prefix<T: Into<String>>(mut self, prefix: T) -> Self {
        self.queue_name_prefix = Some(prefix.into());
        self
    }

    /// Timeout applied when attempting to publish a message.
    /// Defaults to 3 seconds if left unspecified.
    #[must_use]
    pub fn publish_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Finalise the builder and get an instance of [`Publisher`].
    pub fn build(self) -> Publisher {
        Publisher {
            channel: self.channel,
            queue: self.queue,
            queue_name_prefix: self.queue_name_prefix,
            timeout: self.timeout,
        }
    }
}

fn inject_amqp_properties(props: BasicProperties) -> BasicProperties {
    let current_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|ct| ct.as_secs());

    let props = if let Some(ct) = current_timestamp {
        let ts = *props.timestamp();
        props.with_timestamp(ts.unwrap_or(ct))
    } else {
        warn!("System time is before 1970");
        props
    };

    let message_id = props.message_id().clone();
    props.with_message_id(message_id.unwrap_or_else(|| Uuid::new_v4().to_string().into()))
}
