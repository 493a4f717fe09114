//! Request ID propagation.
//!
//! The ID comes from the inbound `x-request-id` header when present and
//! non-empty, otherwise a random UUID v4 is generated. Either way it is
//! stored in the request context, recorded on the request span and echoed on
//! the response under the same header.

use http::HeaderValue;
use uuid::Uuid;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Maintains the `x-request-id` header.
#[derive(Clone, Copy, Debug)]
pub struct RequestId {
    generate: fn() -> String,
}

impl RequestId {
    pub fn new() -> Self {
        Self { generate: || Uuid::new_v4().to_string() }
    }

    /// Uses `generate` instead of UUID v4 for requests without an ID.
    pub fn with_generator(generate: fn() -> String) -> Self {
        Self { generate }
    }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl Middleware for RequestId {
    fn handle<'a>(&'a self, mut req: Request, next: Next) -> BoxFuture<'a> {
        let id = match req.header(REQUEST_ID_HEADER) {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => (self.generate)(),
        };
        req.context_mut().set_request_id(id);
        let id = req.context().request_id().map(str::to_owned).unwrap_or_default();
        req.context().logger().record("request_id", id.as_str());

        Box::pin(async move {
            let mut res = next.run(req).await;
            match HeaderValue::from_str(&id) {
                Ok(value) => {
                    res.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                Err(_) => tracing::warn!(request_id = %id, "request id is not a valid header value"),
            }
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::middleware::Chain;
    use crate::response::Response;

    fn request(id: Option<&str>) -> Request {
        let mut builder = http::Request::get("/v2/ledgers");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        Request::from_http(builder.body(Bytes::new()).unwrap(), "127.0.0.1:1")
    }

    /// Echoes the context's request ID in the body.
    async fn echo(req: Request) -> Response {
        Response::text(req.context().request_id().unwrap_or("<none>").to_owned())
    }

    #[tokio::test]
    async fn inbound_id_is_echoed_verbatim() {
        let pipeline = Chain::new().with(RequestId::new()).finish(echo);
        for _ in 0..3 {
            let res = pipeline.call(request(Some("req-123"))).await;
            assert_eq!(res.header(REQUEST_ID_HEADER), Some("req-123"));
            assert_eq!(res.body().as_ref(), b"req-123");
        }
    }

    #[tokio::test]
    async fn missing_id_is_generated_and_matches_context() {
        let pipeline = Chain::new().with(RequestId::new()).finish(echo);
        let res = pipeline.call(request(None)).await;
        let header = res.header(REQUEST_ID_HEADER).unwrap().to_owned();
        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(res.body().as_ref(), header.as_bytes());
    }

    #[tokio::test]
    async fn empty_header_counts_as_missing() {
        let pipeline = Chain::new()
            .with(RequestId::with_generator(|| "generated".to_owned()))
            .finish(echo);
        let res = pipeline.call(request(Some(""))).await;
        assert_eq!(res.header(REQUEST_ID_HEADER), Some("generated"));
    }

    #[tokio::test]
    async fn id_is_set_on_aborted_responses() {
        let pipeline = Chain::new()
            .with(RequestId::new())
            .with(crate::middleware::from_fn(|_req, _next| async {
                Response::status(StatusCode::FORBIDDEN)
            }))
            .finish(echo);
        let res = pipeline.call(request(Some("req-9"))).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.header(REQUEST_ID_HEADER), Some("req-9"));
    }
}
