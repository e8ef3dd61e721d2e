use crate::amqp::ConnectionFactory;
use crate::consumers::builders::consumer_group::ConsumerGroupBuilder;
use crate::consumers::Consumer;
use std::sync::Arc;

const DEFAULT_PREFETCH_COUNT: u16 = 50;

/// Group-level configuration values for a [`ConsumerGroup`](super::ConsumerGroup).
///
/// Use [`ConsumerGroupConfigurationBuilder`] to build an instance of `ConsumerGroupConfiguration`.
pub(super) struct ConsumerGroupConfiguration<Context>
where
    Context: Send + Sync + 'static,
{
    pub(super) connection_factory: ConnectionFactory,
    pub(super) queue_name_prefix: Option<String>,
    pub(super) prefetch_count: u16,
    pub(super) context: Arc<Context>,
}

/// A builder for group-level configuration of a [`ConsumerGroup`](super::ConsumerGroup).
///
/// Use [`ConsumerGroup::builder`](super::ConsumerGroup::builder) as entrypoint.
pub struct ConsumerGroupConfigurationBuilder<Context>(ConsumerGroupConfiguration<Context>)
where
    Context: Send + Sync + 'static;

impl<Context> ConsumerGroupConfigurationBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    pub(super) fn new(connection_factory: ConnectionFactory, context: Arc<Context>) -> Self {
        Self(ConsumerGroupConfiguration {
            connection_factory,
            queue_name_prefix: None,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            context,
        })
    }

    /// Add a prefix to the name of the queues consumed by the group.
    ///
    /// E.g. `test` as prefix will give you `test|X` queue names.
    /// Publishers addressing these queues through the default exchange must be configured with
    /// the same prefix, see [`PublisherBuilder::queue_name_prefix`].
    ///
    /// [`PublisherBuilder::queue_name_prefix`]: crate::publishers::PublisherBuilder::queue_name_prefix
    #[must_use]
    pub fn queue_name_prefix<T: Into<String>>(mut self, prefix: T) -> Self {
        self.0.queue_name_prefix = Some(prefix.into());
        self
    }

    /// Configure the prefetch count of consumers in the group.
    /// If not configured, the prefetch count is set to a default value of 50.
    ///
    /// Consumers can override it with [`ConsumerBuilder::with_prefetch_count`].
    ///
    /// [`ConsumerBuilder::with_prefetch_count`]: crate::consumers::ConsumerBuilder::with_prefetch_count
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.0.prefetch_count = prefetch_count;
        self
    }

    /// Once you have specified all the group-level configuration you need,
    /// you can start adding [`Consumer`]s!
    ///
    /// Check out [`Consumer::builder`] to build out a consumer.
    ///
    /// # Implementation Notes
    ///
    /// After you start adding consumers you are prevented from introducing new group-level
    /// configuration.
    /// This is enforced by returning a different builder type, [`ConsumerGroupBuilder`], which
    /// only exposes methods to add other consumers and build the whole group.
    pub fn consumer(self, consumer: Consumer<Context>) -> ConsumerGroupBuilder<Context> {
        ConsumerGroupBuilder {
            group_configuration: self.0,
            consumers: vec![consumer],
        }
    }
}
