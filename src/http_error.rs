//! Request-level error taxonomy and its mapping onto the wire.
//!
//! Handlers return [`ApiError`]. At the handler boundary the error is
//! resolved into an [`HttpError`] and rendered as the canonical body:
//!
//! ```text
//! { "errors": [ { "status": "404", "title": "Not Found", "detail": "..." } ] }
//! ```
//!
//! Resolution is an exhaustive match on the variant, never a downcast:
//!
//! | Variant                  | Status | Body                                 |
//! |--------------------------|--------|--------------------------------------|
//! | `ApiError::Http`         | as-is  | as-is                                |
//! | `ApiError::Validation`   | 400    | one entry per failing field          |
//! | `ApiError::Internal`     | 500    | `Internal Server Error`, no detail   |
//!
//! Internal error text is logged, never sent to the client.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::response::{IntoResponse, Response};
use crate::validation::{FieldFailures, Validated};

const VALIDATION_TITLE: &str = "Validation error";

/// Pre-rendered body used if the error body itself cannot be serialised.
const FALLBACK_BODY: &[u8] = br#"{"errors":[{"status":"500","title":"Internal Server Error"}]}"#;

// ── Wire shape ────────────────────────────────────────────────────────────────

/// One entry of the canonical error body.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorObject {
    pub status: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The canonical error body: `{"errors": [...]}`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorObject>,
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// A resolved, wire-ready error: a status plus the entries of the body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpError {
    status: StatusCode,
    errors: Vec<ErrorObject>,
}

impl HttpError {
    /// Single-entry error whose title is the canonical reason phrase and whose
    /// detail is `message`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            errors: vec![ErrorObject {
                status: status.as_str().to_owned(),
                title: reason(status).to_owned(),
                detail: Some(message.into()),
            }],
        }
    }

    /// Single-entry error with no detail.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status,
            errors: vec![ErrorObject {
                status: status.as_str().to_owned(),
                title: reason(status).to_owned(),
                detail: None,
            }],
        }
    }

    /// Multi-entry error, e.g. one entry per invalid field.
    pub fn with_errors(status: StatusCode, errors: Vec<ErrorObject>) -> Self {
        Self { status, errors }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn errors(&self) -> &[ErrorObject] { &self.errors }

    /// Detail of the first entry, if any.
    pub fn message(&self) -> Option<&str> {
        self.errors.first().and_then(|e| e.detail.as_deref())
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { errors: self.errors.clone() }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", self.status.as_u16(), reason(self.status))?;
        let details: Vec<&str> = self.errors.iter().filter_map(|e| e.detail.as_deref()).collect();
        if !details.is_empty() {
            write!(f, ": {}", details.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self.body()).unwrap_or_else(|_| FALLBACK_BODY.to_vec());
        Response::builder().status(self.status).json(body)
    }
}

// ── ApiError ──────────────────────────────────────────────────────────────────

/// Coarse classification of every error a handler can produce.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unauthorized,
    Forbidden,
    Internal,
}

/// The error type returned by route handlers and query services.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Already resolved: explicit status and body entries.
    #[error("{0}")]
    Http(#[from] HttpError),

    /// Struct validation failed; `target` is the validated type's name.
    #[error("{target} validation failed: {failures}")]
    Validation {
        target: &'static str,
        failures: FieldFailures,
    },

    /// Anything else. Rendered as an opaque 500.
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError::new(StatusCode::NOT_FOUND, message).into()
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::new(StatusCode::BAD_REQUEST, message).into()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        HttpError::new(StatusCode::UNAUTHORIZED, message).into()
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        HttpError::new(StatusCode::FORBIDDEN, message).into()
    }

    pub fn internal(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Internal(source.into())
    }

    /// Struct validation failure for a value of type `T`, in `T`'s field
    /// order.
    pub fn validation<T: Validated>(report: garde::Report) -> Self {
        Self::from_failures::<T>(FieldFailures::from_report(&report, T::FIELDS))
    }

    pub(crate) fn from_failures<T: ?Sized>(failures: FieldFailures) -> Self {
        Self::Validation { target: short_type_name::<T>(), failures }
    }

    /// `ValidationFailed: <path|query> parameter '<name>' is invalid`.
    pub fn invalid_param(param_type: impl fmt::Display, name: &str) -> Self {
        Self::bad_request(format!("ValidationFailed: {param_type} parameter '{name}' is invalid"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(e) => match e.status() {
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
                StatusCode::FORBIDDEN => ErrorKind::Forbidden,
                s if s.is_client_error() => ErrorKind::BadRequest,
                _ => ErrorKind::Internal,
            },
            Self::Validation { .. } => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Resolves the error into its wire form.
    pub fn resolve(&self) -> HttpError {
        match self {
            Self::Http(e) => e.clone(),
            Self::Validation { target, failures } => {
                let errors = failures
                    .iter()
                    .map(|failure| ErrorObject {
                        status: StatusCode::BAD_REQUEST.as_str().to_owned(),
                        title: VALIDATION_TITLE.to_owned(),
                        detail: Some(format!(
                            "Field '{target}.{}' validation failed on '{}' tag",
                            failure.path, failure.tag
                        )),
                    })
                    .collect();
                HttpError::with_errors(StatusCode::BAD_REQUEST, errors)
            }
            Self::Internal(_) => HttpError::from_status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let resolved = self.resolve();
        if resolved.status().is_server_error() {
            error!(error = %self, "failed to process request");
        } else {
            info!(error = %self, status = resolved.status().as_u16(), "request rejected");
        }
        resolved.into_response()
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Strip generic arguments before taking the last path segment.
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
