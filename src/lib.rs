//! # ledger-api
//!
//! Routing, middleware and auth core of the ledger REST API.
//!
//! ## The pipeline
//!
//! Every request walks the same path:
//!
//! ```text
//! hyper ──▶ InjectLogger ──▶ RequestId ──▶ LogRequests ──▶ user middleware ──▶ route handler
//! ```
//!
//! The three default middleware are always installed first. Anything added
//! with [`Router::middleware`] (CORS, [`auth::Authenticate`]) runs inside
//! them, in registration order. A middleware may answer on its own without
//! calling the next layer.
//!
//! Handlers return anything that implements [`IntoResponse`], usually
//! `Result<Json<T>, ApiError>`. Errors are rendered at the handler boundary
//! as the canonical body:
//!
//! ```text
//! {"errors":[{"status":"404","title":"Not Found"}]}
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ledger_api::middleware::Cors;
//! use ledger_api::{ApiError, Json, Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ledger_api::Error> {
//!     let app = Router::new()
//!         .middleware(Cors::new())
//!         .get("/v2/ledgers/:ledgerID", show_ledger)
//!         .build();
//!
//!     Server::bind("0.0.0.0:8080")?.serve(app).await
//! }
//!
//! async fn show_ledger(req: Request) -> Result<Json<String>, ApiError> {
//!     let mut ledger_id = String::new();
//!     req.bind_params().path_param("ledgerID").string(&mut ledger_id).finish()?;
//!     Ok(Json(ledger_id))
//! }
//! ```

mod binder;
mod context;
mod error;
mod handler;
mod http_error;
mod method;
mod request;
mod response;
mod router;
mod server;
mod validation;

pub mod api;
pub mod auth;
pub mod config;
pub mod health;
pub mod ledgers;
pub mod logging;
pub mod middleware;
pub mod transactions;

pub use binder::{ParamBinder, ParamType, ParamsBinder};
pub use context::RequestContext;
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use http_error::{ApiError, ErrorBody, ErrorKind, ErrorObject, HttpError};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{App, Router, RouterConfig};
pub use server::{DEFAULT_MAX_BODY_BYTES, Server};
pub use validation::{FieldFailure, FieldFailures, Validated};
