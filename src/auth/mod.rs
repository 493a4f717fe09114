//! Token authentication and per-route scope authorization.
//!
//! Two independent pieces:
//!
//! - [`Authenticate`] is middleware. It asks a [`RequestValidator`] for the
//!   caller's token and claims and stores the claims in the request context.
//!   Requests without a token pass through anonymously.
//! - [`authorize`] wraps a single route handler and rejects requests whose
//!   claims lack the required scopes.
//!
//! ```rust,ignore
//! router
//!     .middleware(Authenticate::new(Hs256Validator::new(secret, iss, aud)))
//!     .get("/v2/ledgers", authorize(list_ledgers, &["read:ledgers"]));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::handler::{BoxFuture, ErasedHandler, Handler};
use crate::http_error::ApiError;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::IntoResponse;

mod hs256;

pub use hs256::Hs256Validator;

// ── Claims ────────────────────────────────────────────────────────────────────

/// The `aud` claim: a single audience or a list.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

/// Claims of an authenticated caller.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Claims {
    #[serde(rename = "iss", default)]
    pub issuer: String,
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,
    #[serde(rename = "exp", default)]
    pub expiry: u64,
    /// Granted scopes, separated by whitespace or commas.
    #[serde(default)]
    pub scope: String,
}

impl Claims {
    /// Scope claim split into individual scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|granted| granted == scope)
    }
}

// ── RequestValidator ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TokenError {
    /// The request carries no token at all.
    #[error("token not found")]
    NotFound,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to get claims: {0}")]
    Claims(String),
}

/// Extracts and verifies the caller's token.
#[async_trait]
pub trait RequestValidator: Send + Sync + 'static {
    type Token: Send + Sync;

    /// Finds and verifies the token. A request without one must yield
    /// [`TokenError::NotFound`].
    async fn validate_request(&self, req: &Request) -> Result<Self::Token, TokenError>;

    /// Reads the claims out of a verified token.
    async fn claims(&self, req: &Request, token: &Self::Token) -> Result<Claims, TokenError>;
}

// ── Authenticate ──────────────────────────────────────────────────────────────

/// Populates [`RequestContext::claims`](crate::RequestContext::claims).
///
/// | Validator outcome               | Result                                 |
/// |---------------------------------|----------------------------------------|
/// | no token                        | anonymous, next runs                   |
/// | token rejected                  | 401 `Token validation failed`          |
/// | claims unreadable               | 401 `Bad token`                        |
/// | ok                              | claims injected, next runs             |
pub struct Authenticate<V> {
    validator: Arc<V>,
}

impl<V: RequestValidator> Authenticate<V> {
    pub fn new(validator: V) -> Self {
        Self { validator: Arc::new(validator) }
    }

    pub fn from_arc(validator: Arc<V>) -> Self {
        Self { validator }
    }
}

impl<V: RequestValidator> Middleware for Authenticate<V> {
    fn handle<'a>(&'a self, mut req: Request, next: Next) -> BoxFuture<'a> {
        Box::pin(async move {
            let token = match self.validator.validate_request(&req).await {
                Ok(token) => token,
                Err(TokenError::NotFound) => return next.run(req).await,
                Err(e) => {
                    error!(error = %e, "Token validation failed");
                    return ApiError::unauthorized("Token validation failed").into_response();
                }
            };

            let claims = match self.validator.claims(&req, &token).await {
                Ok(claims) => claims,
                Err(e) => {
                    error!(error = %e, "Failed to get claims");
                    return ApiError::unauthorized("Bad token").into_response();
                }
            };

            req.context_mut().set_claims(claims);
            next.run(req).await
        })
    }
}

// ── Scope authorization ───────────────────────────────────────────────────────

/// Outcome of checking claims against a route's required scopes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Authorization {
    NoClaims,
    Authorized,
    /// The first required scope the claims do not grant.
    Forbidden(String),
}

pub fn authorize_claims(claims: Option<&Claims>, required: &[String]) -> Authorization {
    let Some(claims) = claims else {
        return Authorization::NoClaims;
    };
    match required.iter().find(|scope| !claims.has_scope(scope)) {
        Some(missing) => Authorization::Forbidden(missing.clone()),
        None => Authorization::Authorized,
    }
}

/// Wraps `handler` so that it only runs for callers granted every scope in
/// `scopes`.
///
/// Anonymous callers get 403 `Access token not found`; callers missing a
/// scope get 403 `Missing scope: <scope>`, naming the first missing one.
pub fn authorize<H: Handler>(handler: H, scopes: &[&str]) -> impl Handler + use<H> {
    let handler = handler.into_boxed_handler();
    let required: Arc<[String]> = scopes.iter().map(|s| (*s).to_owned()).collect();

    move |req: Request| {
        let handler = Arc::clone(&handler);
        let required = Arc::clone(&required);
        async move {
            match authorize_claims(req.context().claims(), &required) {
                Authorization::Authorized => handler.call(req).await,
                Authorization::NoClaims => {
                    info!("Request has not been initialized with claims");
                    ApiError::forbidden("Access token not found").into_response()
                }
                Authorization::Forbidden(missing) => {
                    info!(scope = %missing, "Failed to authorize request");
                    ApiError::forbidden(format!("Missing scope: {missing}")).into_response()
                }
            }
        }
    }
}
