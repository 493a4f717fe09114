//! Middleware layer.
//!
//! Middleware intercepts requests on the way in and responses on the way out,
//! and is the place for cross-cutting concerns: logger injection, request
//! IDs, request logging, CORS and authentication.
//!
//! # Ordering
//!
//! The chain is an explicit fold over an ordered list. The first registered
//! middleware is the outermost layer: it sees the request first and the
//! response last.
//!
//! ```text
//! request  ──▶ mw[0] ──▶ mw[1] ──▶ … ──▶ mw[n-1] ──▶ endpoint
//! response ◀── mw[0] ◀── mw[1] ◀── … ◀── mw[n-1] ◀──┘
//! ```
//!
//! # Aborting
//!
//! A middleware short-circuits by returning a response without calling
//! [`Next::run`]. Nothing downstream runs, neither later middleware nor the
//! route handler.

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

pub mod cors;
pub mod log_requests;
pub mod logger;
pub mod request_id;

pub use cors::Cors;
pub use log_requests::LogRequests;
pub use logger::InjectLogger;
pub use request_id::{RequestId, REQUEST_ID_HEADER};

/// One interceptor in the chain.
///
/// ```rust
/// use ledger_api::middleware::{Middleware, Next};
/// use ledger_api::{BoxFuture, Request};
///
/// struct Timing;
///
/// impl Middleware for Timing {
///     fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a> {
///         Box::pin(async move {
///             let started = std::time::Instant::now();
///             let res = next.run(req).await;
///             tracing::debug!(elapsed = ?started.elapsed(), "timed");
///             res
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a>;
}

/// The remainder of the chain after the current middleware.
///
/// Consumed by [`run`](Next::run), so it can be invoked at most once.
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    /// Passes the request to the next layer and waits for its response.
    pub async fn run(self, req: Request) -> Response {
        self.inner.call(req).await
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Adapts an async closure into a [`Middleware`].
///
/// ```rust
/// use ledger_api::middleware::from_fn;
///
/// let mw = from_fn(|req, next| async move {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert("x-served-by", "ledger".parse().unwrap());
///     res
/// });
/// # let _ = mw;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FnMiddleware(f)
}

/// Middleware built by [`from_fn`].
pub struct FnMiddleware<F>(F);

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a> {
        Box::pin((self.0)(req, next))
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered, append-only list of middleware.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` as the innermost layer so far.
    pub fn push(&mut self, middleware: impl Middleware) {
        self.layers.push(Arc::new(middleware));
    }

    /// Builder-style [`push`](Chain::push).
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.push(middleware);
        self
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Wraps `endpoint` in every layer.
    pub fn finish(&self, endpoint: impl Handler) -> Pipeline {
        Pipeline(self.compose(endpoint.into_boxed_handler()))
    }

    /// Folds from the innermost layer outwards so that `layers[0]` ends up
    /// outermost.
    pub(crate) fn compose(&self, endpoint: BoxedHandler) -> BoxedHandler {
        self.layers.iter().rev().fold(endpoint, |next, middleware| {
            Arc::new(Layer { middleware: Arc::clone(middleware), next })
        })
    }
}

/// A composed chain plus its endpoint.
#[derive(Clone)]
pub struct Pipeline(BoxedHandler);

impl Pipeline {
    pub(crate) fn from_handler(handler: BoxedHandler) -> Self {
        Self(handler)
    }

    pub async fn call(&self, req: Request) -> Response {
        self.0.call(req).await
    }
}

struct Layer {
    middleware: Arc<dyn Middleware>,
    next: BoxedHandler,
}

impl ErasedHandler for Layer {
    fn call(&self, req: Request) -> BoxFuture<'static> {
        let middleware = Arc::clone(&self.middleware);
        let next = Next { inner: Arc::clone(&self.next) };
        Box::pin(async move { middleware.handle(req, next).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    fn request() -> Request {
        Request::from_http(http::Request::get("/").body(Bytes::new()).unwrap(), "127.0.0.1:1")
    }

    type Trace = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, trace: Trace) -> impl Middleware {
        from_fn(move |req, next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(format!("in:{name}"));
                let res = next.run(req).await;
                trace.lock().unwrap().push(format!("out:{name}"));
                res
            }
        })
    }

    #[tokio::test]
    async fn first_registered_is_outermost() {
        let trace: Trace = Arc::default();
        let chain = (0..4).fold(Chain::new(), |chain, i| {
            let name: &'static str = ["0", "1", "2", "3"][i];
            chain.with(recording(name, Arc::clone(&trace)))
        });
        let handler_trace = Arc::clone(&trace);
        let pipeline = chain.finish(move |_req: Request| {
            let trace = Arc::clone(&handler_trace);
            async move {
                trace.lock().unwrap().push("handler".to_owned());
                StatusCode::OK
            }
        });

        let res = pipeline.call(request()).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *trace.lock().unwrap(),
            vec![
                "in:0", "in:1", "in:2", "in:3", "handler",
                "out:3", "out:2", "out:1", "out:0",
            ]
        );
    }

    #[tokio::test]
    async fn abort_skips_downstream_layers_and_handler() {
        let trace: Trace = Arc::default();
        let pipeline = Chain::new()
            .with(recording("outer", Arc::clone(&trace)))
            .with(from_fn(|_req, _next| async { Response::status(StatusCode::UNAUTHORIZED) }))
            .with(recording("inner", Arc::clone(&trace)))
            .finish({
                let trace = Arc::clone(&trace);
                move |_req: Request| {
                    let trace = Arc::clone(&trace);
                    async move {
                        trace.lock().unwrap().push("handler".to_owned());
                        StatusCode::OK
                    }
                }
            });

        let res = pipeline.call(request()).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(*trace.lock().unwrap(), vec!["in:outer", "out:outer"]);
    }

    #[tokio::test]
    async fn empty_chain_calls_endpoint_directly() {
        let pipeline = Chain::new().finish(|_req: Request| async { "ok" });
        let res = pipeline.call(request()).await;
        assert_eq!(res.body().as_ref(), b"ok");
    }
}
