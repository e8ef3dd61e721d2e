use carrot_router::amqp::convenience::field_table;
use carrot_router::amqp::topology::{Exchange, ExchangeKind, Queue};
use carrot_router::amqp::types::AMQPValue;
use carrot_router::amqp::{configuration::RabbitMqSettings, ConnectionFactory};
use carrot_router::publishers::Publisher;

#[derive(serde::Serialize)]
struct Order {
    id: u64,
    quantity: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First of all we build the configuration for our connection factory.
    // We are using the out-of-the-box parameters for the default RabbitMq Docker image.
    let settings = RabbitMqSettings::default();
    let connection_factory = ConnectionFactory::new_from_config(&settings)?;

    // With publisher confirms enabled the broker acknowledges every message: publishing a
    // message that cannot be routed to any queue fails.
    let channel = connection_factory.new_publisher_channel(true).await?;

    // The queue is bound to an exchange with a routing key: messages are published to the
    // exchange using that routing key.
    let shop_exchange = Exchange::new("shop", ExchangeKind::Topic).durable(true);
    let orders = Queue::new("orders").bound_to(shop_exchange, "orders.created");
    let publisher = Publisher::builder(channel.clone(), orders)
        // Timeout on the publishing operation.
        .publish_timeout(std::time::Duration::from_secs(3))
        .build();

    let headers = field_table([
        ("kind", AMQPValue::LongString("order".into())),
        ("version", AMQPValue::LongString("2".into())),
    ]);
    publisher
        .publish_record(&Order { id: 1, quantity: 3 }, Some(headers))
        .await?;

    // Queues that are not bound are published to through the default exchange, using the
    // queue name as routing key. The prefix must match the one of the consumer group.
    let notifications = Publisher::builder(channel, Queue::new("notifications"))
        .queue_name_prefix("test")
        .build();
    notifications.publish("Hello world!", None).await?;

    // Raw bytes are never sent: publishing them fails before reaching the broker.
    let raw = "Hello world!".as_bytes();
    assert!(notifications.publish(raw, None).await.is_err());

    Ok(())
}
