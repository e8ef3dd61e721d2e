pub use consumer_group::{ConsumerGroup, ConsumerGroupBuilder};
pub use consumer_group_configuration::ConsumerGroupConfigurationBuilder;

mod consumer_group;
mod consumer_group_configuration;
