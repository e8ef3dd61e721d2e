use futures_util::{future::try_join_all, stream::FuturesUnordered, StreamExt};
use lapin::Connection;
use shutdown_handler::ShutdownHandler;

use crate::{
    amqp::ConnectionFactory,
    consumers::{
        builders::consumer_group_configuration::ConsumerGroupConfiguration,
        consumer::BoundConsumer, Consumer, ConsumerGroupConfigurationBuilder,
    },
};
use std::sync::Arc;

/// A collection of RabbitMq consumers sharing the same context and connection.
///
/// `ConsumerGroup` is the main entrypoint if you want to pull and process messages from queues.
/// Each `ConsumerGroup` opens a single connection to the broker; each consumer gets its own
/// channel on that connection.
///
/// # How do I build a `ConsumerGroup`?
///
/// `ConsumerGroup` provides a fluent API to add configuration step-by-step, known as
/// "builder pattern" in Rust.
/// The starting point is [`ConsumerGroup::builder`].
///
/// Once you are done with group-level configuration, you can start adding consumers using
/// [`ConsumerGroupConfigurationBuilder::consumer`] and [`ConsumerGroupBuilder::consumer`].
///
/// # Example
///
/// ```no_run
/// use carrot_router::amqp::{configuration::RabbitMqSettings, topology::Queue, ConnectionFactory};
/// use carrot_router::consumers::{Consumer, ConsumerGroup, Route};
/// use std::sync::Arc;
///
/// async fn on_text(_context: Arc<()>, body: String) -> Result<(), anyhow::Error> {
///     println!("{body}");
///     Ok(())
/// }
///
/// # async fn run() -> Result<(), anyhow::Error> {
/// let factory = ConnectionFactory::new_from_config(&RabbitMqSettings::default())?;
/// let consumer = Consumer::builder(Queue::new("notifications"))
///     .route(Route::builder().handler(on_text))
///     .build()?;
///
/// ConsumerGroup::builder(factory, ())
///     .queue_name_prefix("staging")
///     .consumer(consumer)
///     .build()
///     .await?
///     .run_until_interrupted()
///     .await
/// # }
/// ```
pub struct ConsumerGroup<Context>
where
    Context: Send + Sync + 'static,
{
    connection: Connection,
    context: Arc<Context>,
    consumers: Vec<BoundConsumer<Context>>,
}

impl<Context> ConsumerGroup<Context>
where
    Context: Send + Sync + 'static,
{
    /// Start building a [`ConsumerGroup`].
    ///
    /// You will need a connection factory and a context.
    ///
    /// # Context
    ///
    /// In handlers you will often need to use resources with a significant initialisation
    /// cost - e.g. a HTTP client, a database connection, etc.
    /// Instead of creating a new instance of these expensive resources every single time you handle
    /// a message, you can put those resources in the _context_.
    ///
    /// The context is created once, before the consumer group is built, and each handler
    /// gets a shared reference to the context together with the decoded body.
    ///
    /// ## Implementation Notes
    ///
    /// The context is wrapped in an `Arc` by `ConsumerGroup` - if your context is already behind
    /// an `Arc` pointer, it won't be "double-wrapped".
    pub fn builder(
        connection_factory: ConnectionFactory,
        context: impl Into<Arc<Context>>,
    ) -> ConsumerGroupConfigurationBuilder<Context> {
        ConsumerGroupConfigurationBuilder::new(connection_factory, context.into())
    }

    /// You can call `run_until_sigterm` to start consuming messages from the queues you bound.
    /// As the name implies, `run_until_sigterm` returns control to the caller only if:
    /// - one of the consumers crashes (e.g. disconnection);
    /// - the application is stopped via SIGTERM.
    pub async fn run_until_sigterm(self) -> Result<(), anyhow::Error> {
        self.run_until_shutdown(ShutdownHandler::sigterm()?).await
    }

    /// Same as [`ConsumerGroup::run_until_sigterm`], stopping on ctrl-c (SIGINT) instead.
    pub async fn run_until_interrupted(self) -> Result<(), anyhow::Error> {
        let shutdown = Arc::new(ShutdownHandler::new());
        let interrupt = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("consumer group interrupted"),
                    Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
                }
                shutdown.shutdown();
            }
        });

        let outcome = self.run_until_shutdown(shutdown).await;
        interrupt.abort();
        outcome
    }

    /// You can call `run_until_shutdown` to start consuming messages from the queues you bound.
    /// As the name implies, `run_until_shutdown` returns control to the caller only if:
    /// - one of the consumers crashes (e.g. disconnection);
    /// - the application is stopped via the shutdown handler.
    ///
    /// When one consumer stops, all the others are shut down too.
    /// The connection is closed before returning.
    #[tracing::instrument(skip_all, name = "consumer_group_run")]
    pub async fn run_until_shutdown(
        self,
        shutdown: Arc<ShutdownHandler>,
    ) -> Result<(), anyhow::Error> {
        let Self {
            connection,
            context,
            consumers,
        } = self;

        let mut consumers = consumers
            .into_iter()
            .map(|c| {
                let shutdown = shutdown.clone();
                let context = context.clone();
                async move {
                    c.run_until_shutdown(context, shutdown.wait_for_signal()).await
                }
            })
            .map(tokio::spawn)
            .collect::<FuturesUnordered<_>>();

        // wait for all consumers to shutdown
        let mut outcome = Ok(());
        while let Some(res) = consumers.next().await {
            let res = res.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = res {
                tracing::error!("Consumer failed: {:?}", e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
            shutdown.shutdown();
        }

        if let Err(e) = connection.close(0, "consumer group stopped").await {
            tracing::warn!("Failed to close the connection: {}", e);
        }
        outcome
    }
}

/// A builder to register consumers once the group-level configuration of a [`ConsumerGroup`]
/// has been finalised.
///
/// Use [`ConsumerGroup::builder`] as entrypoint.
pub struct ConsumerGroupBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    pub(super) group_configuration: ConsumerGroupConfiguration<Context>,
    pub(super) consumers: Vec<Consumer<Context>>,
}

impl<Context> ConsumerGroupBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    /// Add another [`Consumer`] to the [`ConsumerGroup`].
    ///
    /// Check out [`Consumer::builder`] to build out a consumer.
    #[must_use]
    pub fn consumer(mut self, consumer: Consumer<Context>) -> Self {
        self.consumers.push(consumer);
        self
    }

    /// Once you have added all your [`Consumer`]s to the [`ConsumerGroup`], you can
    /// finalise the group by calling `build`.
    ///
    /// When you `.await` `build`, a connection is established with the message broker and the
    /// queues (together with their exchanges and bindings) are declared, each consumer on its
    /// own channel.
    ///
    /// `build` does NOT trigger consumptions of messages!
    /// Check out [`ConsumerGroup::run_until_sigterm`].
    pub async fn build(self) -> Result<ConsumerGroup<Context>, anyhow::Error> {
        let Self {
            group_configuration,
            consumers,
        } = self;
        let ConsumerGroupConfiguration {
            connection_factory,
            queue_name_prefix,
            prefetch_count,
            context,
        } = group_configuration;

        let connection = connection_factory.new_connection().await?;

        let bound = consumers.into_iter().map(|c| {
            let queue_name = c.queue().qualified_name(queue_name_prefix.as_deref());
            c.bind(&connection, queue_name, prefetch_count)
        });
        let consumers = match try_join_all(bound).await {
            Ok(consumers) => consumers,
            Err(e) => {
                let closed = connection.close(0, "consumer group setup failed").await;
                if let Err(close_error) = closed {
                    tracing::warn!("Failed to close the connection: {}", close_error);
                }
                return Err(e);
            }
        };

        Ok(ConsumerGroup {
            connection,
            context,
            consumers,
        })
    }
}
