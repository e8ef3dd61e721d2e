/// Error returned when a [`Consumer`](crate::consumers::Consumer) is misconfigured.
///
/// Configuration errors surface when the consumer is built, before it connects to the broker.
#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("Route #{index} of the consumer for queue `{queue_name}` has no handler")]
    MissingHandler { queue_name: String, index: usize },
    #[error("The consumer for queue `{queue_name}` has no routes")]
    NoRoutes { queue_name: String },
}
