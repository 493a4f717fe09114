//! Logger injection.
//!
//! Opens one `request` span per request as a child of the root span given at
//! construction, stores it in the [`RequestContext`](crate::RequestContext)
//! and runs the rest of the chain inside it. Downstream middleware record
//! fields on it (the request ID) and every event emitted while the request is
//! processed is attributed to it.

use tracing::{Instrument, Span, field};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Installs the per-request logger handle. Always the outermost middleware.
#[derive(Clone, Debug)]
pub struct InjectLogger {
    root: Span,
}

impl InjectLogger {
    /// Request spans become children of `root`. Pass [`Span::none()`] for
    /// top-level request spans.
    pub fn new(root: Span) -> Self {
        Self { root }
    }
}

impl Default for InjectLogger {
    fn default() -> Self {
        Self::new(Span::none())
    }
}

impl Middleware for InjectLogger {
    fn handle<'a>(&'a self, mut req: Request, next: Next) -> BoxFuture<'a> {
        let span = tracing::info_span!(
            parent: &self.root,
            "request",
            method = %req.method(),
            path = %req.path(),
            request_id = field::Empty,
        );
        req.context_mut().set_logger(span.clone());
        Box::pin(next.run(req).instrument(span))
    }
}
