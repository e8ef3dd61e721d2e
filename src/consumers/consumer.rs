use crate::amqp::topology::Queue;
use crate::consumers::error::ConfigurationError;
use crate::consumers::incoming_message::Delivery;
use crate::consumers::outcome::{Acknowledgement, DispatchOutcome};
use crate::consumers::route::{RouteBuilder, RouteError};
use crate::consumers::router::Router;
use amq_protocol_types::FieldTable;
use futures_util::{Future, FutureExt, StreamExt};
use lapin::options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions};
use lapin::{Channel, Connection};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

/// A consumer pulls messages from a single queue and routes each of them to at most one handler.
///
/// Consumers are registered on a [`ConsumerGroup`], which declares their queue and runs them.
///
/// # Routing
///
/// Every message goes through [`Consumer::dispatch`]:
/// - the first [`Route`] matching the message headers is selected, in registration order;
/// - the payload is decoded into the body type of the route handler and the handler is invoked;
/// - decoding failures, handler errors and handler panics are logged and contained;
/// - the message is acked, whatever the outcome, unless the consumer runs with auto-ack.
///
/// Messages that do not match any route are dropped: they are logged and acked without invoking
/// any handler.
///
/// # Example
///
/// ```rust
/// use carrot_router::amqp::topology::Queue;
/// use carrot_router::consumers::{Consumer, Route};
/// use std::sync::Arc;
///
/// async fn on_text(_context: Arc<()>, body: String) -> Result<(), anyhow::Error> {
///     println!("{body}");
///     Ok(())
/// }
///
/// let consumer = Consumer::builder(Queue::new("notifications"))
///     .route(Route::builder().with_str_header("format", "text").handler(on_text))
///     .build()
///     .unwrap();
/// assert_eq!(consumer.router().len(), 1);
/// ```
///
/// [`ConsumerGroup`]: crate::consumers::ConsumerGroup
/// [`Route`]: crate::consumers::Route
pub struct Consumer<Context>
where
    Context: Send + Sync + 'static,
{
    queue: Queue,
    auto_ack: bool,
    exclusive: bool,
    consumer_tag: Option<String>,
    prefetch_count: Option<u16>,
    router: Router<Context>,
}

impl<Context> Consumer<Context>
where
    Context: Send + Sync + 'static,
{
    /// Start building a [`Consumer`] for `queue`.
    pub fn builder(queue: Queue) -> ConsumerBuilder<Context> {
        ConsumerBuilder {
            queue,
            auto_ack: false,
            exclusive: false,
            consumer_tag: None,
            prefetch_count: None,
            routes: Vec::new(),
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn router(&self) -> &Router<Context> {
        &self.router
    }

    pub fn auto_ack(&self) -> bool {
        self.auto_ack
    }

    /// Route an incoming message to the first matching handler and acknowledge it.
    ///
    /// `dispatch` never fails: processing errors are logged and reported in the returned
    /// [`DispatchOutcome`].
    #[tracing::instrument(
        name = "dispatch_message",
        skip_all,
        fields(queue_name = %self.queue.name, delivery_tag = delivery.delivery_tag),
        level = tracing::Level::DEBUG
    )]
    pub async fn dispatch(&self, context: &Arc<Context>, delivery: &Delivery) -> DispatchOutcome {
        let headers = delivery.headers();

        let (matched_route, result) = match self.router.select(&headers) {
            Some((index, route)) => {
                let result = AssertUnwindSafe(route.invoke(context.clone(), &delivery.data))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(RouteError::Panic(panic_message(panic))));
                if let Err(e) = &result {
                    tracing::error!(
                        error.message = %e,
                        error.details = ?e,
                        route = index,
                        shape = %route.shape(),
                        "Failed to process message"
                    );
                }
                (Some(index), result)
            }
            None => {
                tracing::warn!(
                    headers = ?headers,
                    "No route matches the message headers, dropping the message"
                );
                (None, Ok(()))
            }
        };

        let acknowledgement = if self.auto_ack {
            Acknowledgement::Automatic
        } else {
            match delivery.acker.acknowledge().await {
                Ok(()) => Acknowledgement::Sent,
                Err(e) => {
                    tracing::error!(
                        error.message = %e,
                        error.details = ?e,
                        "Failed to ack message"
                    );
                    Acknowledgement::Failed(e)
                }
            }
        };

        DispatchOutcome {
            delivery_tag: delivery.delivery_tag,
            matched_route,
            result,
            acknowledgement,
        }
    }

    /// Open a dedicated channel on `connection` and declare the consumer queue on it.
    ///
    /// The queue is declared as `queue_name`, the queue name qualified by the group prefix.
    #[tracing::instrument(skip_all, name = "consumer_bind", fields(queue_name = %queue_name))]
    pub(super) async fn bind(
        self,
        connection: &Connection,
        queue_name: String,
        default_prefetch_count: u16,
    ) -> Result<BoundConsumer<Context>, anyhow::Error> {
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(
                self.prefetch_count.unwrap_or(default_prefetch_count),
                BasicQosOptions { global: false },
            )
            .await?;
        self.queue.declare(&channel, &queue_name).await?;

        Ok(BoundConsumer {
            consumer: self,
            channel,
            queue_name,
        })
    }
}

/// A [`Consumer`] with its own channel, ready to consume from its declared queue.
pub(super) struct BoundConsumer<Context>
where
    Context: Send + Sync + 'static,
{
    consumer: Consumer<Context>,
    channel: Channel,
    queue_name: String,
}

impl<Context> BoundConsumer<Context>
where
    Context: Send + Sync + 'static,
{
    /// Notify RabbitMq to start pushing messages from the queue and dispatch them one at a time.
    ///
    /// `run_until_shutdown` exits if the consumer fails with an error (e.g. the channel is closed
    /// or the connection with RabbitMq is lost) or once it has been cancelled after a shutdown
    /// signal. The channel is closed on exit.
    #[tracing::instrument(skip_all, name = "consumer_run", fields(queue_name = %self.queue_name))]
    pub(super) async fn run_until_shutdown(
        self,
        context: Arc<Context>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        let Self {
            consumer,
            channel,
            queue_name,
        } = self;

        let consumer_tag = consumer
            .consumer_tag
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let consume = channel
            .basic_consume(
                &queue_name,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: consumer.auto_ack,
                    exclusive: consumer.exclusive,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await;
        let mut deliveries = match consume {
            Ok(deliveries) => deliveries,
            Err(e) => {
                tracing::error!("Failed to start consuming: {}", e);
                close_channel(&channel).await;
                return Err(e.into());
            }
        };

        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        let result = 'event_loop: loop {
            tokio::select! {
                // Shutdowns take precedence over incoming deliveries.
                biased;

                _ = &mut shutdown => {
                    tracing::info!("consumer received shutdown event");
                    // Cancelling the consumer ends the delivery stream.
                    if let Err(e) = channel
                        .basic_cancel(&consumer_tag, BasicCancelOptions::default())
                        .await
                    {
                        tracing::warn!("Failed to cancel consumer: {}", e);
                        break 'event_loop Ok(());
                    }
                }

                event = deliveries.next() => {
                    match event {
                        None => break 'event_loop Ok(()),
                        Some(Err(e)) => {
                            tracing::error!("Consumer error: {}", e);
                            break 'event_loop Err(e.into());
                        }
                        Some(Ok(delivery)) => {
                            let delivery = Delivery::from(delivery);
                            consumer.dispatch(&context, &delivery).await;
                        }
                    }
                }
            }
        };

        close_channel(&channel).await;
        result
    }
}

async fn close_channel(channel: &Channel) {
    if let Err(e) = channel.close(0, "consumer stopped").await {
        tracing::warn!("Failed to close consumer channel: {}", e);
    }
}

/// A builder to compose a [`Consumer`] with a fluent API.
///
/// Use [`Consumer::builder`] as entrypoint.
pub struct ConsumerBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    queue: Queue,
    auto_ack: bool,
    exclusive: bool,
    consumer_tag: Option<String>,
    prefetch_count: Option<u16>,
    routes: Vec<RouteBuilder<Context>>,
}

impl<Context> ConsumerBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    /// With auto-ack on, the broker considers messages acknowledged as soon as they are sent.
    /// The consumer never acks them itself.
    ///
    /// Off by default.
    #[must_use]
    pub fn auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    /// Request exclusive access to the queue: no other consumer can consume from it.
    #[must_use]
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// The tag identifying the consumer on its channel.
    /// A random one is generated if not specified.
    #[must_use]
    pub fn consumer_tag(mut self, consumer_tag: impl Into<String>) -> Self {
        self.consumer_tag = Some(consumer_tag.into());
        self
    }

    /// Override the group-level prefetch count for this consumer.
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = Some(prefetch_count);
        self
    }

    /// Register another route. Routes are tried in the order they are registered.
    #[must_use]
    pub fn route(mut self, route: RouteBuilder<Context>) -> Self {
        self.routes.push(route);
        self
    }

    /// Validate the routes and assemble the [`Consumer`].
    pub fn build(self) -> Result<Consumer<Context>, ConfigurationError> {
        let Self {
            queue,
            auto_ack,
            exclusive,
            consumer_tag,
            prefetch_count,
            routes,
        } = self;

        if routes.is_empty() {
            return Err(ConfigurationError::NoRoutes {
                queue_name: queue.name,
            });
        }
        let routes = routes
            .into_iter()
            .enumerate()
            .map(|(index, route)| route.build(&queue.name, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Consumer {
            queue,
            auto_ack,
            exclusive,
            consumer_tag,
            prefetch_count,
            router: Router::new(routes),
        })
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
