//! Path and query parameter binding.
//!
//! Binding is a fluent chain over one request:
//!
//! ```rust,ignore
//! let mut ledger_id = String::new();
//! let mut limit = 0_i64;
//! req.bind_params()
//!     .path_param("ledgerID").string(&mut ledger_id)
//!     .query_param("limit").default("50").int(&mut limit)
//!     .finish()?;
//! ```
//!
//! The first failed conversion latches its error on the chain. Every bind
//! after that is a no-op: it neither converts nor writes its receiver, so
//! exactly one failure is reported and the untouched receivers keep their
//! zero values.

use std::fmt;

use tracing::info;

use crate::http_error::ApiError;
use crate::request::Request;
use crate::validation::{self, Validated};

/// Where a parameter is read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamType {
    Path,
    Query,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
        })
    }
}

/// A binding chain over one request. Obtain via [`Request::bind_params`].
#[must_use = "a binding chain must be ended with `validate` or `finish`"]
pub struct ParamsBinder<'r> {
    req: &'r Request,
    err: Option<ApiError>,
}

impl<'r> ParamsBinder<'r> {
    pub(crate) fn new(req: &'r Request) -> Self {
        Self { req, err: None }
    }

    /// Binds the named path segment. Absent segments bind as `""`.
    pub fn path_param(self, name: &str) -> ParamBinder<'r> {
        let raw = self.req.param(name).unwrap_or_default().to_owned();
        ParamBinder::new(self, ParamType::Path, name, raw)
    }

    /// Binds the first value of the named query parameter. Absent parameters
    /// bind as `""`.
    pub fn query_param(self, name: &str) -> ParamBinder<'r> {
        let raw = self.req.query_value(name).unwrap_or_default();
        ParamBinder::new(self, ParamType::Query, name, raw)
    }

    /// Ends the chain with struct validation of `target`.
    ///
    /// A latched bind error is returned as is, without running validation.
    /// Otherwise every failing field is collected, in declaration order, into
    /// one `ValidationFailed: params [a b] are invalid` error.
    pub fn validate<T: Validated>(self, target: &T) -> Result<(), ApiError> {
        if let Some(err) = self.err {
            return Err(err);
        }
        validation::check(target).map_err(|failures| {
            info!(%failures, "failed to validate params");
            let fields: Vec<&str> = failures.iter().map(|f| f.path.as_str()).collect();
            ApiError::bad_request(format!("ValidationFailed: params [{}] are invalid", fields.join(" ")))
        })
    }

    /// Ends the chain without struct validation.
    pub fn finish(self) -> Result<(), ApiError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn latch(&mut self, err: ApiError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

/// One parameter inside a [`ParamsBinder`] chain.
#[must_use = "a parameter binder does nothing until a terminal extractor is called"]
pub struct ParamBinder<'r> {
    param_type: ParamType,
    name: String,
    raw: String,
    binder: ParamsBinder<'r>,
}

impl<'r> ParamBinder<'r> {
    fn new(binder: ParamsBinder<'r>, param_type: ParamType, name: &str, raw: String) -> Self {
        Self { param_type, name: name.to_owned(), raw, binder }
    }

    /// Substitutes `value` when the raw value is empty.
    pub fn default(mut self, value: &str) -> Self {
        if self.raw.is_empty() {
            self.raw = value.to_owned();
        }
        self
    }

    pub fn raw(&self) -> &str { &self.raw }

    /// Writes the raw value.
    pub fn string(self, receiver: &mut String) -> ParamsBinder<'r> {
        let Self { raw, binder, .. } = self;
        if binder.err.is_none() {
            *receiver = raw;
        }
        binder
    }

    /// Parses the raw value as a base-10 integer.
    pub fn int(self, receiver: &mut i64) -> ParamsBinder<'r> {
        self.custom(receiver, |raw| raw.parse::<i64>())
    }

    /// Converts the raw value with `convert`.
    ///
    /// The receiver and the converted value share one type, checked at compile
    /// time. A conversion error latches
    /// `ValidationFailed: <type> parameter '<name>' is invalid`.
    pub fn custom<T, E, F>(self, receiver: &mut T, convert: F) -> ParamsBinder<'r>
    where
        F: FnOnce(&str) -> Result<T, E>,
        E: fmt::Display,
    {
        let Self { param_type, name, raw, mut binder } = self;
        if binder.err.is_some() {
            return binder;
        }
        match convert(&raw) {
            Ok(value) => *receiver = value,
            Err(e) => {
                info!(error = %e, param_type = %param_type, param = %name, "failed to bind param");
                binder.latch(ApiError::invalid_param(param_type, &name));
            }
        }
        binder
    }
}
