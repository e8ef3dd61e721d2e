//! Queues and exchanges, as declared by consumers and addressed by publishers.
//!
//! ```
//! use carrot_router::amqp::topology::{Exchange, ExchangeKind, Queue};
//!
//! // A durable queue bound to a topic exchange with the `orders.created` routing key.
//! let orders = Queue::new("orders")
//!     .durable(true)
//!     .bound_to(
//!         Exchange::new("shop", ExchangeKind::Topic).durable(true),
//!         "orders.created",
//!     );
//! assert_eq!(orders.publish_target(None), ("shop".to_owned(), "orders.created".to_owned()));
//!
//! // A queue published to directly, through the default exchange.
//! let audit = Queue::new("audit");
//! assert_eq!(audit.publish_target(Some("staging")), ("".to_owned(), "staging|audit".to_owned()));
//! ```

use amq_protocol_types::FieldTable;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::Channel;
pub use lapin::ExchangeKind;

/// Separates the queue name prefix from the queue name.
pub const QUEUE_NAME_DELIMITER: &str = "|";

/// An exchange messages are published to.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub name: String,
    pub kind: ExchangeKind,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
}

impl Exchange {
    /// A transient exchange; all declaration flags are off.
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            passive: false,
            durable: false,
            auto_delete: false,
            internal: false,
        }
    }

    #[must_use]
    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    #[must_use]
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// Ensure the exchange exists on the broker.
    pub async fn declare(&self, channel: &Channel) -> Result<(), anyhow::Error> {
        channel
            .exchange_declare(
                &self.name,
                self.kind.clone(),
                ExchangeDeclareOptions {
                    passive: self.passive,
                    durable: self.durable,
                    auto_delete: self.auto_delete,
                    internal: self.internal,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

/// A queue, optionally bound to an exchange with a routing key.
#[derive(Debug, Clone, PartialEq)]
pub struct Queue {
    pub name: String,
    pub exchange: Option<Exchange>,
    pub routing_key: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl Queue {
    /// A transient queue, not bound to any exchange.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exchange: None,
            routing_key: String::new(),
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: false,
        }
    }

    /// Bind the queue to `exchange` using `routing_key`.
    #[must_use]
    pub fn bound_to(mut self, exchange: Exchange, routing_key: impl Into<String>) -> Self {
        self.exchange = Some(exchange);
        self.routing_key = routing_key.into();
        self
    }

    #[must_use]
    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    #[must_use]
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    /// The name of the queue on the broker, namespaced by `prefix` if there is one.
    ///
    /// E.g. `staging` as prefix turns `orders` into `staging|orders`.
    pub fn qualified_name(&self, prefix: Option<&str>) -> String {
        match prefix {
            Some(prefix) => format!("{prefix}{QUEUE_NAME_DELIMITER}{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The exchange the queue is bound to, if it is bound with a routing key.
    pub fn binding(&self) -> Option<(&Exchange, &str)> {
        match &self.exchange {
            Some(exchange) if !self.routing_key.is_empty() => {
                Some((exchange, self.routing_key.as_str()))
            }
            _ => None,
        }
    }

    /// Where a message for this queue must be published: `(exchange, routing key)`.
    ///
    /// Queues bound to an exchange are reached through that exchange and their routing key.
    /// Every other queue is reached through the default exchange, using the queue name as
    /// routing key.
    pub fn publish_target(&self, prefix: Option<&str>) -> (String, String) {
        match self.binding() {
            Some((exchange, routing_key)) => (exchange.name.clone(), routing_key.to_owned()),
            None => (String::new(), self.qualified_name(prefix)),
        }
    }

    /// Declare the queue as `queue_name` and, if it is bound, its exchange and the binding.
    #[tracing::instrument(name = "declare_topology", skip(self, channel))]
    pub async fn declare(&self, channel: &Channel, queue_name: &str) -> Result<(), anyhow::Error> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: self.passive,
                    durable: self.durable,
                    exclusive: self.exclusive,
                    auto_delete: self.auto_delete,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;

        if let Some((exchange, routing_key)) = self.binding() {
            exchange.declare(channel).await?;
            channel
                .queue_bind(
                    queue_name,
                    &exchange.name,
                    routing_key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await?;
        }

        Ok(())
    }
}
