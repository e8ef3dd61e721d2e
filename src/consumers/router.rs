use crate::consumers::route::Route;
use amq_protocol_types::FieldTable;

/// The ordered collection of [`Route`]s registered on a consumer.
///
/// Registration order is priority order: [`Router::select`] returns the first route matching
/// the headers of a message.
pub struct Router<Context>
where
    Context: Send + Sync + 'static,
{
    routes: Vec<Route<Context>>,
}

impl<Context> Router<Context>
where
    Context: Send + Sync + 'static,
{
    pub(super) fn new(routes: Vec<Route<Context>>) -> Self {
        Self { routes }
    }

    /// The first route matching `headers`, together with its registration index.
    pub fn select(&self, headers: &FieldTable) -> Option<(usize, &Route<Context>)> {
        self.routes
            .iter()
            .enumerate()
            .find(|(_, route)| route.matches(headers))
    }

    pub fn routes(&self) -> &[Route<Context>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
