//! Begin/end request logging.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::LogConfig;
use crate::handler::BoxFuture;
use crate::health::PING_PATH;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Logs a `BEGIN REQ` event before the rest of the chain runs and an
/// `END REQ` event after it, for every path outside the ignore set.
#[derive(Clone, Debug)]
pub struct LogRequests {
    ignore_paths: HashSet<String>,
    memory_usage: fn() -> f64,
}

impl LogRequests {
    /// Ignores the health-check ping and reports resident memory.
    pub fn new() -> Self {
        Self {
            ignore_paths: HashSet::from([PING_PATH.to_owned()]),
            memory_usage: resident_memory_mb,
        }
    }

    /// Requests for `path` pass through unlogged.
    pub fn ignore_path(mut self, path: impl Into<String>) -> Self {
        self.ignore_paths.insert(path.into());
        self
    }

    /// Replaces the memory reader. The reader returns megabytes.
    pub fn with_memory_reader(mut self, read: fn() -> f64) -> Self {
        self.memory_usage = read;
        self
    }
}

impl Default for LogRequests {
    fn default() -> Self { Self::new() }
}

impl From<&LogConfig> for LogRequests {
    fn from(cfg: &LogConfig) -> Self {
        cfg.ignore_paths
            .iter()
            .fold(Self::new(), |mw, path| mw.ignore_path(path.as_str()))
    }
}

impl Middleware for LogRequests {
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a> {
        Box::pin(async move {
            if self.ignore_paths.contains(req.path()) {
                return next.run(req).await;
            }

            let method = req.method().clone();
            let path = req.path().to_owned();
            let (remote_address, remote_port) = split_host_port(req.remote_addr());
            let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (key, value) in req.query_pairs() {
                query.entry(key).or_default().push(value);
            }

            info!(
                method = %method,
                url = req.request_uri(),
                path = %path,
                user_agent = req.header("user-agent").unwrap_or_default(),
                headers = ?req.headers(),
                query = ?query,
                remote_address = %remote_address,
                remote_port = %remote_port,
                memory_usage_mb = (self.memory_usage)(),
                "BEGIN REQ: {method} {path}"
            );

            let started = Instant::now();
            let res = next.run(req).await;
            let status = res.status_code().as_u16();

            info!(
                status_code = status,
                headers = ?res.headers(),
                duration = started.elapsed().as_secs_f64(),
                memory_usage_mb = (self.memory_usage)(),
                "END REQ: {status} - {path}"
            );
            res
        })
    }
}

/// How long a memory reading is reused before `/proc` is read again.
const MEMORY_REFRESH: Duration = Duration::from_secs(1);

static RESIDENT_MEMORY: MemorySampler = MemorySampler::new(MEMORY_REFRESH, read_resident_memory_mb);

/// Resident set size of this process in megabytes, rounded to three
/// decimals. `0.0` where `/proc` is unavailable.
///
/// The value is sampled at most once per second, so logging a request does
/// not read `/proc` on the async worker.
pub fn resident_memory_mb() -> f64 {
    RESIDENT_MEMORY.sample(Instant::now())
}

/// Caches the last reading of `read` for `refresh`.
struct MemorySampler {
    refresh: Duration,
    read: fn() -> f64,
    last: Mutex<Option<(Instant, f64)>>,
}

impl MemorySampler {
    const fn new(refresh: Duration, read: fn() -> f64) -> Self {
        Self { refresh, read, last: Mutex::new(None) }
    }

    fn sample(&self, now: Instant) -> f64 {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some((at, mb)) if now.saturating_duration_since(at) < self.refresh => mb,
            _ => {
                let mb = (self.read)();
                *last = Some((now, mb));
                mb
            }
        }
    }
}

fn read_resident_memory_mb() -> f64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0.0;
    };
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<f64>().ok())
        .map_or(0.0, |kb| round3(kb / 1024.0))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Splits `host:port`. An address that cannot be split is logged and returned
/// whole as the host with an empty port.
fn split_host_port(addr: &str) -> (String, String) {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return (sock.ip().to_string(), sock.port().to_string());
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && !port.is_empty() => {
            (host.to_owned(), port.to_owned())
        }
        _ => {
            warn!(remote_addr = addr, "can not parse remote addr");
            (addr.to_owned(), String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use http::StatusCode;
    use rstest::rstest;

    use super::*;
    use crate::middleware::Chain;

    #[rstest]
    #[case("127.0.0.1:8080", "127.0.0.1", "8080")]
    #[case("[::1]:443", "::1", "443")]
    #[case("ledger.local:9000", "ledger.local", "9000")]
    #[case("pipe", "pipe", "")]
    #[case("", "", "")]
    fn splits_remote_addresses(#[case] addr: &str, #[case] host: &str, #[case] port: &str) {
        assert_eq!(split_host_port(addr), (host.to_owned(), port.to_owned()));
    }

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(round3(12.34567), 12.346);
        assert_eq!(round3(0.0004), 0.0);
    }

    static READS: AtomicUsize = AtomicUsize::new(0);

    fn counting_read() -> f64 {
        READS.fetch_add(1, Ordering::SeqCst) as f64
    }

    #[test]
    fn memory_is_read_at_most_once_per_refresh() {
        let sampler = MemorySampler::new(Duration::from_secs(1), counting_read);
        let start = Instant::now();

        assert_eq!(sampler.sample(start), 0.0);
        assert_eq!(sampler.sample(start + Duration::from_millis(500)), 0.0);
        assert_eq!(READS.load(Ordering::SeqCst), 1);

        assert_eq!(sampler.sample(start + Duration::from_secs(2)), 1.0);
        assert_eq!(READS.load(Ordering::SeqCst), 2);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    impl Capture {
        fn output(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn request(uri: &str) -> Request {
        Request::from_http(
            http::Request::get(uri)
                .header("user-agent", "rstest")
                .body(Bytes::new())
                .unwrap(),
            "10.1.2.3:5555",
        )
    }

    #[tokio::test]
    async fn logs_begin_and_end_events() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let pipeline = Chain::new()
            .with(LogRequests::new().with_memory_reader(|| 42.5))
            .finish(|_req: Request| async { StatusCode::CREATED });
        pipeline.call(request("/v2/ledgers?limit=10&tag=a&tag=b")).await;

        let out = capture.output();
        assert!(out.contains("BEGIN REQ: GET /v2/ledgers"), "{out}");
        assert!(out.contains("END REQ: 201 - /v2/ledgers"), "{out}");
        assert!(out.contains(r#""remote_address":"10.1.2.3""#), "{out}");
        assert!(out.contains(r#""remote_port":"5555""#), "{out}");
        assert!(out.contains(r#""memory_usage_mb":42.5"#), "{out}");
        assert!(out.contains(r#""url":"/v2/ledgers?limit=10&tag=a&tag=b""#), "{out}");
    }

    #[tokio::test]
    async fn ignored_paths_are_not_logged() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let pipeline = Chain::new()
            .with(LogRequests::new().ignore_path("/internal"))
            .finish(|_req: Request| async { StatusCode::OK });
        let res = pipeline.call(request(PING_PATH)).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        pipeline.call(request("/internal")).await;

        assert!(!capture.output().contains("REQ:"));
    }
}
