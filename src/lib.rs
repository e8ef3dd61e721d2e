//! `carrot-router` is a routing and dispatch layer, built on top of [`lapin`],
//! to consume and publish typed messages with RabbitMQ.
//!
//! Consumers register [`Route`](crate::consumers::Route)s on a queue: each incoming message is
//! routed to the first route whose headers it carries, its payload is decoded into the type the
//! route handler expects and the handler is invoked. Processing failures are logged and
//! contained; messages are acked whatever the outcome.
//!
//! [`Publisher`](crate::publishers::Publisher) and [`ConsumerGroup`](crate::consumers::ConsumerGroup)
//! are the best starting points to learn more about what `carrot-router` provides and how
//! to leverage it.
//!
//! ## Examples
//!
//! Check the `demos` directory as well to see the library in action.

pub mod consumers;
pub mod publishers;

pub mod amqp;
pub mod codec;
