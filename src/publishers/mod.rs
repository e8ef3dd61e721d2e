//! Facilities to publish messages to a RabbitMq queue. Check out [`Publisher`] as a starting point.
mod channel;
mod publisher;

pub use channel::PublishChannel;
pub use publisher::{Publisher, PublisherBuilder, PublisherError};
