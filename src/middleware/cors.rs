//! CORS headers and preflight handling.

use http::{HeaderValue, StatusCode};
use http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Adds `Access-Control-Allow-*` headers to every response and answers
/// `OPTIONS` preflights with an empty 200 without running the route.
#[derive(Clone, Debug)]
pub struct Cors {
    allow_origin: HeaderValue,
    allow_headers: HeaderValue,
}

impl Cors {
    pub fn new() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            allow_headers: HeaderValue::from_static("X-Request-ID,Authorization"),
        }
    }

    /// Panics if `origin` is not a valid header value.
    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = HeaderValue::from_str(origin)
            .unwrap_or_else(|_| panic!("invalid CORS origin: {origin:?}"));
        self
    }

    /// Panics if `headers` is not a valid header value.
    pub fn allow_headers(mut self, headers: &str) -> Self {
        self.allow_headers = HeaderValue::from_str(headers)
            .unwrap_or_else(|_| panic!("invalid CORS header list: {headers:?}"));
        self
    }

    fn apply(&self, res: &mut Response) {
        let headers = res.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
    }
}

impl Default for Cors {
    fn default() -> Self { Self::new() }
}

impl Middleware for Cors {
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut res = if req.method() == http::Method::OPTIONS {
                Response::builder().status(StatusCode::OK).no_body()
            } else {
                next.run(req).await
            };
            self.apply(&mut res);
            res
        })
    }
}
