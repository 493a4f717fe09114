//! Per-request context.
//!
//! A [`RequestContext`] is created together with each [`Request`](crate::Request)
//! and dropped with it. Middleware fill it on the way in; handlers read it.

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::auth::Claims;

/// State carried alongside one request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Option<String>,
    logger: Span,
    claims: Option<Claims>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new() -> Self {
        Self {
            request_id: None,
            logger: Span::none(),
            claims: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// The request ID, once the request-ID middleware has run.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Sets the request ID. The first value wins; later calls are ignored.
    pub fn set_request_id(&mut self, id: impl Into<String>) {
        if self.request_id.is_none() {
            self.request_id = Some(id.into());
        }
    }

    /// The request's logger handle.
    ///
    /// Events emitted while the request is processed are already recorded
    /// inside this span; use it explicitly with `tracing::info!(parent: ...)`
    /// from work spawned outside the request task.
    pub fn logger(&self) -> &Span {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: Span) {
        self.logger = logger;
    }

    /// Claims of the authenticated caller, absent for anonymous requests.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn set_claims(&mut self, claims: Claims) {
        self.claims = Some(claims);
    }

    /// Cancelled when the client goes away or the request deadline elapses.
    ///
    /// Query services should race their work against
    /// [`CancellationToken::cancelled`].
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self { Self::new() }
}
