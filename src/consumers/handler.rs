//! The `Handler` trait is heavily inspired by `tide`'s approach to endpoint handlers.
use crate::codec::FromPayload;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Implementers of the `Handler` trait can be attached to a [`Route`] to process the messages
/// it matches.
///
/// # Scope
///
/// `handle` only sees the decoded body and the shared context: it does not get access to the
/// underlying RabbitMq channel nor to the raw delivery.
/// The framework takes care of decoding the payload into [`Handler::Body`] and of acking the
/// message with the broker, whatever the outcome of `handle`.
///
/// # Implementers
///
/// While you can implement `Handler` for a struct or enum, most of the time you will be relying
/// on [`RouteBuilder::handler`], which accepts async functions with a matching signature -
/// `Fn(Arc<Context>, Body) -> Fut`.
///
/// [`Route`]: crate::consumers::Route
/// [`RouteBuilder::handler`]: crate::consumers::RouteBuilder::handler
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    type Context: Send + Sync + 'static;
    /// The shape the payload is decoded into before `handle` is called.
    type Body: FromPayload;
    type Error: Into<anyhow::Error> + Send + 'static;

    async fn handle(
        &self,
        context: Arc<Self::Context>,
        body: Self::Body,
    ) -> Result<(), Self::Error>;
}

/// Wrapper type to turn an async function into a [`Handler`].
///
/// `ClosureHandler` is implemented for all functions of the form:
/// ```ignore
/// async fn(context: Arc<Context>, body: Body) -> Result<(), impl Into<anyhow::Error>>;
/// ```
pub struct ClosureHandler<F, Context, Body> {
    f: F,
    _marker: PhantomData<fn(Arc<Context>, Body)>,
}

impl<F, Context, Body> ClosureHandler<F, Context, Body> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut, Context, Body, E> Handler for ClosureHandler<F, Context, Body>
where
    Context: Send + Sync + 'static,
    Body: FromPayload,
    F: Fn(Arc<Context>, Body) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<anyhow::Error> + Send + 'static,
{
    type Context = Context;
    type Body = Body;
    type Error = E;

    async fn handle(&self, context: Arc<Context>, body: Body) -> Result<(), E> {
        // `self.f`, in this case, is a function, which we are calling on its arguments using
        // parenthesis notation - (self.f)(_)
        (self.f)(context, body).await
    }
}
