use carrot_router::amqp::topology::{Exchange, ExchangeKind, Queue};
use carrot_router::amqp::{configuration::RabbitMqSettings, ConnectionFactory};
use carrot_router::codec::{Json, JsonMap};
use carrot_router::consumers::{Consumer, ConsumerGroup, Route};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First of all we build the configuration for our connection factory.
    // We are using the out-of-the-box parameters for the default RabbitMq Docker image.
    // Use `RabbitMqSettings::managed` to connect to a managed broker instead.
    let settings = RabbitMqSettings::default();
    let connection_factory = ConnectionFactory::new_from_config(&settings)?;

    // Handlers often need resources with a significant initialisation cost - e.g. a HTTP
    // client or a database connection pool.
    // They belong in the _context_: it is created once and every handler gets a shared
    // reference to it together with the decoded payload.
    //
    // In this sample we are using a dummy `Context` type holding an integer.
    let context = Context { seed: 42 };

    // A consumer pulls messages from a single queue and routes each of them to the first
    // route whose headers are all carried by the message.
    //
    // The body type of each handler decides how the payload is decoded:
    // - `Json<T>` for a typed record;
    // - `JsonMap` for a generic JSON object;
    // - `String` for UTF-8 text;
    // - `Vec<u8>` for the raw bytes.
    //
    // Payloads that fail to decode never reach the handler: the failure is logged and the
    // message is acked anyway.
    let shop_exchange = Exchange::new("shop", ExchangeKind::Topic).durable(true);
    let orders_queue = Queue::new("orders")
        .durable(true)
        .bound_to(shop_exchange, "orders.#");
    let orders = Consumer::builder(orders_queue)
        // Routes are tried in the order they are registered.
        .route(
            Route::builder()
                .with_str_header("kind", "order")
                .with_str_header("version", "2")
                .handler(order_handler),
        )
        .route(
            Route::builder()
                .with_str_header("kind", "order")
                .handler(legacy_order_handler),
        )
        // A route without headers matches every message: a catch-all.
        // Without it, messages matching no route would be dropped (and acked).
        .route(Route::builder().handler(fallback_handler))
        .build()?;

    let notifications = Consumer::builder(Queue::new("notifications"))
        // With auto-ack on, the broker considers messages acked as soon as they are delivered.
        .auto_ack(true)
        .with_prefetch_count(10)
        .route(Route::builder().handler(notification_handler))
        .build()?;

    // A consumer group runs a set of consumers sharing the same context and connection.
    let consumer_group = ConsumerGroup::builder(connection_factory, context)
        // Using `queue_name_prefix` you can namespace all the queues of the group.
        // Using `test` we will have `test|orders` and `test|notifications` as queue names.
        .queue_name_prefix("test")
        .consumer(orders)
        .consumer(notifications)
        // When you await `build`, we establish a connection with the message broker and declare
        // the queues, the exchanges and their bindings.
        // After you call `build` the group does NOT start consuming messages (yet)!
        .build()
        .await?;

    // `run_until_interrupted` returns control to the caller only if:
    // - one of the consumers crashes (e.g. disconnection);
    // - the application is stopped with ctrl-c.
    consumer_group.run_until_interrupted().await?;

    Ok(())
}

pub struct Context {
    seed: u64,
}

#[derive(serde::Deserialize, Debug)]
pub struct Order {
    id: u64,
    quantity: u32,
}

pub async fn order_handler(context: Arc<Context>, order: Json<Order>) -> Result<(), anyhow::Error> {
    anyhow::ensure!(order.quantity > 0, "Order {} is empty", order.id);
    println!("Order {:?} (seed {})", order.into_inner(), context.seed);
    Ok(())
}

pub async fn legacy_order_handler(
    _context: Arc<Context>,
    order: JsonMap,
) -> Result<(), anyhow::Error> {
    let fields: Vec<_> = order.keys().collect();
    println!("Legacy order with fields {fields:?}");
    Ok(())
}

pub async fn fallback_handler(_context: Arc<Context>, body: Vec<u8>) -> Result<(), anyhow::Error> {
    println!("Unknown message of {} bytes", body.len());
    Ok(())
}

pub async fn notification_handler(
    _context: Arc<Context>,
    text: String,
) -> Result<(), anyhow::Error> {
    println!("Notification: {text}");
    Ok(())
}
