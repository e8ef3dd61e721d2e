use crate::publishers::PublisherError;
use lapin::{
    options::BasicPublishOptions, publisher_confirm::Confirmation, BasicProperties, Channel,
};

/// The broker-send primitive used by [`Publisher`](super::Publisher).
///
/// Implemented for `lapin`'s [`Channel`]. You only need to implement it yourself to observe
/// what a publisher sends without a broker, e.g. in tests.
#[async_trait::async_trait]
pub trait PublishChannel: Send + Sync + 'static {
    /// Publish `payload` on `exchange` using `routing_key`.
    ///
    /// `exchange` is empty for the default exchange, which routes to the queue named
    /// `routing_key`.
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublisherError>;
}

#[async_trait::async_trait]
impl PublishChannel for Channel {
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublisherError> {
        let options = BasicPublishOptions {
            // Unroutable messages are only reported back when publisher confirms are on.
            mandatory: self.status().confirm(),
            // The immediate flag was dropped in RabbitMQ 3.0 - see https://www.rabbitmq.com/blog/2012/11/19/breaking-things-with-rabbitmq-3-0/
            // Setting `true` will cause a not-supported error
            immediate: false,
        };
        publish(self, payload, options, exchange, routing_key, properties).await
    }
}

/// Publish a payload on a RabbitMq exchange, waiting for publisher confirmation from the
/// RabbitMq broker.
///
/// The mandatory flag tells the broker how to react if the message cannot be routed to a queue.
/// If this flag is `true`, the broker will return an unroutable message with a Return method.
/// If this flag is `false`, the broker silently drops the message.
#[tracing::instrument(level = "debug", skip(channel, payload, properties))]
async fn publish(
    channel: &Channel,
    payload: &[u8],
    options: BasicPublishOptions,
    exchange: &str,
    routing_key: &str,
    properties: BasicProperties,
) -> Result<(), PublisherError> {
    // Delivery mode: Non-persistent (1) or persistent (2).
    let properties = properties.with_delivery_mode(2);

    let confirm = channel
        .basic_publish(exchange, routing_key, options, payload, properties)
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?;

    match confirm {
        Confirmation::Ack(ack) => {
            if let Some(return_message) = ack {
                // Reply Code 312 - NO_ROUTE
                // See https://www.rabbitmq.com/amqp-0-9-1-reference.html
                if return_message.reply_code == 312 {
                    return Err(PublisherError::UnroutableMessage(return_message));
                }
            }
            Ok(())
        }
        Confirmation::Nack(nack) => Err(PublisherError::NegativeAck(nack)),
        Confirmation::NotRequested => Ok(()),
    }
}
