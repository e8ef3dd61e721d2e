use amq_protocol_types::FieldTable;
use carrot_router::amqp::configuration::RabbitMqSettings;
use carrot_router::amqp::{BasicProperties, Channel, ConnectionFactory};
use carrot_router::consumers::{Acknowledge, Delivery};
use carrot_router::publishers::{PublishChannel, PublisherError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn get_rabbitmq_settings() -> RabbitMqSettings {
    RabbitMqSettings::default()
}

pub fn get_connection_factory() -> ConnectionFactory {
    ConnectionFactory::new_from_config(&get_rabbitmq_settings()).unwrap()
}

/// A channel with publisher confirms, unroutable messages are reported as errors.
pub async fn get_publisher_channel() -> Channel {
    get_connection_factory()
        .new_publisher_channel(true)
        .await
        .unwrap()
}

/// Counts the acks sent for the deliveries it is attached to.
#[derive(Clone, Default)]
pub struct RecordingAcker {
    acks: Arc<AtomicUsize>,
}

impl RecordingAcker {
    pub fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Acknowledge for RecordingAcker {
    async fn acknowledge(&self) -> Result<(), anyhow::Error> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An acker whose channel has gone away.
pub struct BrokenAcker;

#[async_trait::async_trait]
impl Acknowledge for BrokenAcker {
    async fn acknowledge(&self) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("The channel is closed"))
    }
}

pub fn delivery(headers: FieldTable, data: &[u8], acker: impl Acknowledge) -> Delivery {
    Delivery::new(
        1,
        BasicProperties::default().with_headers(headers),
        data.to_vec(),
        acker,
    )
}

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub properties: BasicProperties,
}

/// Keeps every message published on it.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    published: Arc<Mutex<Vec<Published>>>,
}

impl RecordingChannel {
    pub async fn published(&self) -> Vec<Published> {
        self.published.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl PublishChannel for RecordingChannel {
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublisherError> {
        self.published.lock().await.push(Published {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
            properties,
        });
        Ok(())
    }
}

/// A broker that never confirms anything.
pub struct StalledChannel;

#[async_trait::async_trait]
impl PublishChannel for StalledChannel {
    async fn basic_publish(
        &self,
        _exchange: &str,
        _routing_key: &str,
        _payload: &[u8],
        _properties: BasicProperties,
    ) -> Result<(), PublisherError> {
        std::future::pending().await
    }
}
