//! Facilities to consume messages from RabbitMq queues and route them to handlers.
//! Check out [`ConsumerGroup`] as a starting point.
pub use builders::{ConsumerGroup, ConsumerGroupBuilder, ConsumerGroupConfigurationBuilder};
pub use consumer::{Consumer, ConsumerBuilder};
pub use error::ConfigurationError;
pub use handler::{ClosureHandler, Handler};
pub use incoming_message::{Acknowledge, Delivery};
pub use outcome::{Acknowledgement, DispatchOutcome};
pub use route::{Route, RouteBuilder, RouteError};
pub use router::Router;

mod builders;
mod consumer;
mod error;
mod handler;
mod incoming_message;
mod outcome;
mod route;
mod router;
