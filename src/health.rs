//! Health-check route.
//!
//! `GET /v2/healthcheck/ping` answers `{"ping":"PONG"}` as long as the
//! process can serve HTTP at all. It has no dependencies and is excluded from
//! request logging by default, so frequent health checks do not flood the logs.

use serde::Serialize;

use crate::request::Request;
use crate::response::Json;
use crate::router::Router;

/// Path of the ping route.
pub const PING_PATH: &str = "/v2/healthcheck/ping";

#[derive(Debug, Serialize)]
pub struct Pong {
    ping: &'static str,
}

/// Liveness check handler.
pub async fn ping(_req: Request) -> Json<Pong> {
    Json(Pong { ping: "PONG" })
}

pub fn routes(router: Router) -> Router {
    router.get(PING_PATH, ping)
}
