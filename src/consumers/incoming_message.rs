use crate::amqp::convenience::BasicPropertiesExt;
use amq_protocol_types::{DeliveryTag, FieldTable, ShortString};
use lapin::{options::BasicAckOptions, BasicProperties};
use std::fmt;

/// Positive acknowledgement of a single delivery.
///
/// Implemented for `lapin`'s acker. You only need to implement it yourself to drive
/// [`Consumer::dispatch`](crate::consumers::Consumer::dispatch) outside of a running
/// consumer group, e.g. in tests.
#[async_trait::async_trait]
pub trait Acknowledge: Send + Sync + 'static {
    /// Acknowledge the delivery this acknowledger was issued for.
    async fn acknowledge(&self) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl Acknowledge for lapin::acker::Acker {
    async fn acknowledge(&self) -> Result<(), anyhow::Error> {
        self.ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(Into::into)
    }
}

/// A received AMQP message.
pub struct Delivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,

    // Hidden from handlers: the dispatcher acks each delivery at most once.
    // https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack.delivery-tag
    pub(crate) acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Assemble a delivery by hand.
    pub fn new(
        delivery_tag: DeliveryTag,
        properties: BasicProperties,
        data: Vec<u8>,
        acker: impl Acknowledge,
    ) -> Self {
        Self {
            delivery_tag,
            exchange: ShortString::from(""),
            routing_key: ShortString::from(""),
            redelivered: false,
            properties,
            data,
            acker: Box::new(acker),
        }
    }

    /// The headers of the message, an empty table if it carries none.
    pub fn headers(&self) -> FieldTable {
        self.properties.headers_or_empty()
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("properties", &self.properties)
            .field("data", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
            acker: Box::new(value.acker),
        }
    }
}
