//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Uri};
use serde::de::DeserializeOwned;

use crate::binder::ParamsBinder;
use crate::context::RequestContext;
use crate::http_error::ApiError;
use crate::validation::{self, Validated};

/// An incoming HTTP request with its body fully read.
#[derive(Debug)]
pub struct Request {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: String,
    context: RequestContext,
}

impl Request {
    /// Wraps an `http` request. `remote_addr` is the peer as `host:port`.
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use ledger_api::Request;
    ///
    /// let req = Request::from_http(
    ///     http::Request::get("/v2/ledgers?limit=10").body(Bytes::new()).unwrap(),
    ///     "10.0.0.7:51234",
    /// );
    /// assert_eq!(req.path(), "/v2/ledgers");
    /// assert_eq!(req.query_value("limit").as_deref(), Some("10"));
    /// ```
    pub fn from_http(req: http::Request<Bytes>, remote_addr: impl Into<String>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: remote_addr.into(),
            context: RequestContext::new(),
        }
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> &str { &self.remote_addr }

    /// Path plus query, as sent by the client.
    pub fn request_uri(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// Header lookup (names are case-insensitive). Non-ASCII values are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/v2/ledgers/:ledgerID`, `req.param("ledgerID")` on
    /// `/v2/ledgers/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decoded query pairs in the order they appear. A malformed query string
    /// yields no pairs.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default()
    }

    /// First decoded value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<String> {
        self.query_pairs().into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn context(&self) -> &RequestContext { &self.context }
    pub fn context_mut(&mut self) -> &mut RequestContext { &mut self.context }

    /// Starts a path/query binding chain. See [`ParamsBinder`].
    pub fn bind_params(&self) -> ParamsBinder<'_> {
        ParamsBinder::new(self)
    }

    /// Decodes the JSON body into `T` and validates it.
    ///
    /// A body that does not decode is an internal error (500); a decoded body
    /// that fails validation is a 400 listing every invalid field.
    pub fn bind_json<T>(&self) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Validated,
    {
        let value: T = serde_json::from_slice(&self.body).map_err(ApiError::internal)?;
        validation::check(&value).map_err(ApiError::from_failures::<T>)?;
        Ok(value)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}
