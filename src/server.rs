//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`. No new connections are made.
//! 2. Telling every open connection to shut down gracefully: requests in
//!    flight finish, idle keep-alive connections close right away.
//! 3. Returning from [`Server::serve`] once every connection is closed, which
//!    lets `main` exit cleanly.
//!
//! Set `terminationGracePeriodSeconds` in the pod manifest to a value longer
//! than the configured request timeout.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::handler::panic_message;
use crate::http_error::{ApiError, HttpError};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::router::App;

/// Request bodies larger than this are answered with 413 unless
/// [`Server::max_body_bytes`] says otherwise.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    max_body_bytes: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use ledger_api::Server;
    /// assert!(Server::bind("0.0.0.0:3000").is_ok());
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse().map_err(|_| Error::Addr(addr.to_owned()))?;
        Ok(Self { addr, max_body_bytes: DEFAULT_MAX_BODY_BYTES })
    }

    /// Caps the size of a request body. Larger bodies get
    /// `413 Payload Too Large` without reaching the app.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `signal` resolves, then drains in-flight
    /// connections.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let app = Arc::new(app);

        info!(addr = %self.addr, "ledger api listening");

        let mut tasks = tokio::task::JoinSet::new();
        let shutdown = CancellationToken::new();
        let max_body_bytes = self.max_body_bytes;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Checked first so a shutdown stops accepting even while
                // connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let shutdown = shutdown.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req, remote_addr, max_body_bytes).await }
                        });

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);
                        let cancelled = shutdown.cancelled();
                        tokio::pin!(cancelled);
                        let mut draining = false;

                        loop {
                            tokio::select! {
                                res = conn.as_mut() => {
                                    if let Err(e) = res {
                                        error!(peer = %remote_addr, "connection error: {e}");
                                    }
                                    break;
                                }
                                () = &mut cancelled, if !draining => {
                                    draining = true;
                                    conn.as_mut().graceful_shutdown();
                                }
                            }
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        shutdown.cancel();
        while tasks.join_next().await.is_some() {}

        info!("ledger api stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request body and runs the request through the app.
///
/// Never fails: every problem is answered with an error response, so hyper
/// only ever sees responses.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    max_body_bytes: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            info!(peer = %remote_addr, limit = max_body_bytes, "request body too large");
            let res = HttpError::from_status(StatusCode::PAYLOAD_TOO_LARGE).into_response();
            return Ok(res.into_inner());
        }
        Err(e) => {
            warn!(peer = %remote_addr, error = %e, "failed to read request body");
            let res = ApiError::bad_request("failed to read request body").into_response();
            return Ok(res.into_inner());
        }
    };

    let req = Request::from_http(http::Request::from_parts(parts, body), remote_addr.to_string());
    // Cancels the request's token when hyper drops this future, which it does
    // when the client disconnects mid-request.
    let _cancel_on_drop = req.context().cancellation().clone().drop_guard();

    let res = match AssertUnwindSafe(app.call(req)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => {
            error!(panic = panic_message(payload.as_ref()), "request pipeline panicked");
            ApiError::internal("request pipeline panicked").into_response()
        }
    };
    Ok(res.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// Windows only Ctrl-C is available. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::router::Router;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    async fn connect(addr: &str) -> TcpStream {
        for _ in 0..50 {
            if let Ok(stream) = TcpStream::connect(addr).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("server did not start on {addr}");
    }

    #[tokio::test]
    async fn serves_requests_until_shutdown() {
        let addr = format!("127.0.0.1:{}", free_port());
        let app = Router::new()
            .post("/echo", |req: Request| async move { String::from_utf8_lossy(req.body()).into_owned() })
            .build();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = Server::bind(&addr).unwrap();
        let handle = tokio::spawn(server.serve_with_shutdown(app, async {
            let _ = stopped.await;
        }));

        let mut stream = connect(&addr).await;
        stream
            .write_all(
                b"POST /echo HTTP/1.1\r\nhost: test\r\nx-request-id: req-123\r\n\
                  content-length: 5\r\nconnection: close\r\n\r\nhello",
            )
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.contains("x-request-id: req-123"), "{raw}");
        assert!(raw.ends_with("hello"), "{raw}");

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_idle_keep_alive_connections() {
        let addr = format!("127.0.0.1:{}", free_port());
        let app = Router::new().get("/x", |_req: Request| async { "ok" }).build();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = Server::bind(&addr).unwrap();
        let handle = tokio::spawn(server.serve_with_shutdown(app, async {
            let _ = stopped.await;
        }));

        let mut stream = connect(&addr).await;
        stream.write_all(b"GET /x HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        while !raw.ends_with(b"ok") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the response");
            raw.extend_from_slice(&buf[..n]);
        }
        assert!(raw.starts_with(b"HTTP/1.1 200 OK"));

        // The connection stays open and idle while the server stops.
        stop.send(()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(3), handle).await;
        assert!(stopped.is_ok(), "server did not stop with an idle keep-alive connection");
        stopped.unwrap().unwrap().unwrap();

        let n = stream.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0, "idle connection was not closed");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_with_413() {
        let addr = format!("127.0.0.1:{}", free_port());
        let app = Router::new()
            .post("/echo", |req: Request| async move { String::from_utf8_lossy(req.body()).into_owned() })
            .build();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = Server::bind(&addr).unwrap().max_body_bytes(4);
        let handle = tokio::spawn(server.serve_with_shutdown(app, async {
            let _ = stopped.await;
        }));

        let mut stream = connect(&addr).await;
        stream
            .write_all(
                b"POST /echo HTTP/1.1\r\nhost: test\r\ncontent-length: 11\r\n\
                  connection: close\r\n\r\nhello world",
            )
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 413 Payload Too Large"), "{raw}");
        assert!(raw.ends_with(r#"{"errors":[{"status":"413","title":"Payload Too Large"}]}"#), "{raw}");

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn rejects_invalid_address() {
        assert!(matches!(Server::bind("localhost"), Err(Error::Addr(_))));
    }
}
