use crate::consumers::route::RouteError;
use amq_protocol_types::DeliveryTag;

/// What happened to a delivery once it went through [`Consumer::dispatch`].
///
/// Processing failures are contained by the dispatcher: they are logged and reported here,
/// never propagated to the consume loop.
///
/// [`Consumer::dispatch`]: crate::consumers::Consumer::dispatch
#[derive(Debug)]
pub struct DispatchOutcome {
    pub(super) delivery_tag: DeliveryTag,
    pub(super) matched_route: Option<usize>,
    pub(super) result: Result<(), RouteError>,
    pub(super) acknowledgement: Acknowledgement,
}

impl DispatchOutcome {
    pub fn delivery_tag(&self) -> DeliveryTag {
        self.delivery_tag
    }

    /// The registration index of the route that processed the message.
    /// `None` if no route matched and the message was dropped.
    pub fn matched_route(&self) -> Option<usize> {
        self.matched_route
    }

    /// The outcome of decoding the payload and invoking the handler.
    /// Unmatched messages are not processed: their result is `Ok(())`.
    pub fn result(&self) -> Result<(), &RouteError> {
        self.result.as_ref().map(|_| ())
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn acknowledgement(&self) -> &Acknowledgement {
        &self.acknowledgement
    }
}

/// How the delivery was acknowledged with the broker.
#[derive(Debug)]
pub enum Acknowledgement {
    /// A positive ack was sent for the delivery.
    Sent,
    /// The consumer runs with auto-ack: the broker considered the delivery acked on send.
    Automatic,
    /// The ack could not be sent.
    Failed(anyhow::Error),
}

impl Acknowledgement {
    pub fn is_sent(&self) -> bool {
        matches!(self, Acknowledgement::Sent)
    }
}
