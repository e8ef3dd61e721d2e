//! Helpers for connecting to a rabbitmq broker and describing its topology.

pub mod configuration;
pub mod convenience;
mod factory;
pub mod topology;
pub use factory::ConnectionFactory;
pub use lapin::{Channel, Connection};

pub use lapin::{options, types, BasicProperties};
