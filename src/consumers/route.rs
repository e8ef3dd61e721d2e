use crate::amqp::convenience::header_values_match;
use crate::codec::{DecodeError, FromPayload, PayloadShape};
use crate::consumers::error::ConfigurationError;
use crate::consumers::handler::{ClosureHandler, Handler};
use amq_protocol_types::{AMQPValue, FieldTable, LongString};
use std::future::Future;
use std::sync::Arc;

/// A route pairs a header predicate with the [`Handler`] processing the messages it matches.
///
/// Routes are registered on a [`Consumer`] and evaluated in registration order: the first route
/// whose predicate matches an incoming message processes it.
///
/// A route matches a message if every header listed in the route is present on the message
/// with an equal value. Additional headers on the message are ignored; a route without headers
/// matches every message.
///
/// # Example
///
/// ```rust
/// use carrot_router::codec::Json;
/// use carrot_router::consumers::Route;
/// use std::sync::Arc;
///
/// #[derive(serde::Deserialize)]
/// struct Order {
///     id: u64,
/// }
///
/// async fn on_order(_context: Arc<()>, order: Json<Order>) -> Result<(), anyhow::Error> {
///     println!("Received order {}", order.id);
///     Ok(())
/// }
///
/// let route = Route::builder().with_str_header("kind", "order").handler(on_order);
/// # drop(route);
/// ```
///
/// [`Consumer`]: crate::consumers::Consumer
pub struct Route<Context>
where
    Context: Send + Sync + 'static,
{
    headers: FieldTable,
    shape: PayloadShape,
    handler: Arc<dyn Invoke<Context>>,
}

impl<Context> Route<Context>
where
    Context: Send + Sync + 'static,
{
    /// Start building a [`Route`].
    pub fn builder() -> RouteBuilder<Context> {
        RouteBuilder::new()
    }

    /// `true` if all the headers of the route are present in `headers` with an equal value.
    pub fn matches(&self, headers: &FieldTable) -> bool {
        let headers = headers.inner();
        self.headers.inner().iter().all(|(name, expected)| {
            headers
                .get(name)
                .map_or(false, |actual| header_values_match(expected, actual))
        })
    }

    /// The headers a message must carry to be processed by this route.
    pub fn headers(&self) -> &FieldTable {
        &self.headers
    }

    /// The shape the payload is decoded into before invoking the handler.
    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    /// Decode `payload` and pass it to the route handler.
    ///
    /// Errors returned by the handler are propagated. Panics are not caught here.
    pub async fn invoke(&self, context: Arc<Context>, payload: &[u8]) -> Result<(), RouteError> {
        self.handler.invoke(context, payload).await
    }
}

/// Error returned when a route fails to process a message.
#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("Failed to decode the payload")]
    Decode(#[from] DecodeError),
    #[error("The route handler failed")]
    Handler(#[source] anyhow::Error),
    #[error("The route handler panicked: {0}")]
    Panic(String),
}

/// Decoding and invocation, with the body type erased.
#[async_trait::async_trait]
trait Invoke<Context>: Send + Sync + 'static {
    async fn invoke(&self, context: Arc<Context>, payload: &[u8]) -> Result<(), RouteError>;
}

#[async_trait::async_trait]
impl<H: Handler> Invoke<H::Context> for H {
    async fn invoke(&self, context: Arc<H::Context>, payload: &[u8]) -> Result<(), RouteError> {
        let body = H::Body::from_payload(payload)?;
        self.handle(context, body)
            .await
            .map_err(|e| RouteError::Handler(e.into()))
    }
}

/// A builder to compose a [`Route`] with a fluent API.
///
/// Use [`Route::builder`] as entrypoint. The route is validated when the [`Consumer`] it is
/// registered on gets built: a route without a handler is a [`ConfigurationError`].
///
/// [`Consumer`]: crate::consumers::Consumer
pub struct RouteBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    headers: FieldTable,
    handler: Option<(PayloadShape, Arc<dyn Invoke<Context>>)>,
}

impl<Context> RouteBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            headers: FieldTable::default(),
            handler: None,
        }
    }

    /// Require the `name` header to be equal to `value`.
    ///
    /// Strings are compared by content and integers by value, whatever AMQP type the publisher
    /// used on the wire.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<AMQPValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Require the `name` header to be the string `value`.
    #[must_use]
    pub fn with_str_header(self, name: &str, value: &str) -> Self {
        self.with_header(name, AMQPValue::LongString(LongString::from(value)))
    }

    /// Require all the headers in `headers`, see [`RouteBuilder::with_header`].
    #[must_use]
    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        for (name, value) in headers.inner() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// The handler function used to process the messages matched by this route.
    ///
    /// The type of the `body` argument determines how the payload is decoded - see
    /// [`FromPayload`] for the supported shapes.
    #[must_use]
    pub fn handler<F, Fut, Body, E>(self, handler: F) -> Self
    where
        F: Fn(Arc<Context>, Body) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send,
        Body: FromPayload,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.raw_handler(ClosureHandler::<F, Context, Body>::new(handler))
    }

    /// The raw handler used to process the messages matched by this route.
    /// Prefer `handler` if you only want to register a function.
    #[must_use]
    pub fn raw_handler<H: Handler<Context = Context>>(mut self, handler: H) -> Self {
        self.handler = Some((H::Body::shape(), Arc::new(handler)));
        self
    }

    pub(super) fn build(
        self,
        queue_name: &str,
        index: usize,
    ) -> Result<Route<Context>, ConfigurationError> {
        let Self { headers, handler } = self;
        let (shape, handler) = handler.ok_or_else(|| ConfigurationError::MissingHandler {
            queue_name: queue_name.to_owned(),
            index,
        })?;
        Ok(Route {
            headers,
            shape,
            handler,
        })
    }
}
