//! Radix-tree request router and the application pipeline.
//!
//! One tree per HTTP method. O(path-length) lookup. Routes are registered at
//! startup, then [`Router::build`] freezes the table together with the
//! middleware chain into an [`App`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use http::StatusCode;
use matchit::Router as MatchitRouter;
use tracing::{Span, debug, error};

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, panic_message};
use crate::http_error::{ApiError, HttpError};
use crate::method::Method;
use crate::middleware::{Chain, InjectLogger, LogRequests, Middleware, Pipeline, RequestId};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Settings for the default middleware and dispatch.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Parent of every request span.
    pub root: Span,
    pub request_id: RequestId,
    pub log_requests: LogRequests,
    /// Handlers still running after this long are cancelled with a 500.
    pub request_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            root: Span::none(),
            request_id: RequestId::new(),
            log_requests: LogRequests::new(),
            request_timeout: None,
        }
    }
}

/// The application router.
///
/// Every router starts with three middleware, outermost first: logger
/// injection, request ID and request logging. Middleware added with
/// [`Router::middleware`] runs inside them, in registration order.
///
/// ```rust,no_run
/// # use ledger_api::{Request, Router};
/// # async fn list(_: Request) -> &'static str { "[]" }
/// # async fn create(_: Request) -> &'static str { "{}" }
/// # async fn show(_: Request) -> &'static str { "{}" }
/// let app = Router::new()
///     .get("/v2/ledgers", list)
///     .post("/v2/ledgers", create)
///     .get("/v2/ledgers/:ledgerID", show)
///     .build();
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    chain: Chain,
    request_timeout: Option<Duration>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let chain = Chain::new()
            .with(InjectLogger::new(config.root))
            .with(config.request_id)
            .with(config.log_requests);
        Self { routes: HashMap::new(), chain, request_timeout: config.request_timeout }
    }

    /// Appends `middleware` inside every middleware registered so far.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Registers a handler for a method + pattern pair.
    ///
    /// Named segments are written `:name` (or `{name}`) and read back with
    /// [`Request::param`].
    ///
    /// # Panics
    ///
    /// On an invalid pattern or one that conflicts with an existing route.
    pub fn handle(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        let path = normalize_pattern(pattern);
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{method} {pattern}`: {e}"));
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.handle(Method::Get, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.handle(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.handle(Method::Put, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.handle(Method::Delete, pattern, handler)
    }

    /// Applies a route-group function, e.g. `router.routes(health::routes)`.
    pub fn routes(self, setup: impl FnOnce(Self) -> Self) -> Self {
        setup(self)
    }

    /// Freezes routes and middleware into an [`App`].
    pub fn build(self) -> App {
        let dispatch: BoxedHandler = Arc::new(Dispatch {
            routes: self.routes,
            request_timeout: self.request_timeout,
        });
        App { pipeline: Pipeline::from_handler(self.chain.compose(dispatch)) }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Rewrites `:name` segments into matchit's `{name}` syntax.
fn normalize_pattern(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ── App ───────────────────────────────────────────────────────────────────────

/// The built application: middleware chain plus route dispatch. Immutable and
/// cheap to clone.
#[derive(Clone)]
pub struct App {
    pipeline: Pipeline,
}

impl App {
    /// Runs one request through the whole pipeline.
    pub async fn call(&self, req: Request) -> Response {
        self.pipeline.call(req).await
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Innermost layer: finds the route and runs its handler.
struct Dispatch {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    request_timeout: Option<Duration>,
}

impl Dispatch {
    fn lookup(&self, method: &http::Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let method = Method::try_from(method).ok()?;
        let matched = self.routes.get(&method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(matched.value), params))
    }
}

impl ErasedHandler for Dispatch {
    fn call(&self, mut req: Request) -> BoxFuture<'static> {
        let Some((handler, params)) = self.lookup(req.method(), req.path()) else {
            debug!(method = %req.method(), path = req.path(), "no route matched");
            return Box::pin(async { HttpError::from_status(StatusCode::NOT_FOUND).into_response() });
        };
        req.set_params(params);
        Box::pin(run_handler(handler, req, self.request_timeout))
    }
}

/// Runs a route handler, turning panics and an elapsed deadline into 500s.
async fn run_handler(handler: BoxedHandler, req: Request, timeout: Option<Duration>) -> Response {
    let cancellation = req.context().cancellation().clone();
    let fut = AssertUnwindSafe(async move { handler.call(req).await }).catch_unwind();

    let outcome = match timeout {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => {
                cancellation.cancel();
                return ApiError::internal(format!("request deadline of {limit:?} elapsed"))
                    .into_response();
            }
        },
    };

    outcome.unwrap_or_else(|payload| {
        error!(panic = panic_message(payload.as_ref()), "handler panicked");
        ApiError::internal("handler panicked").into_response()
    })
}
