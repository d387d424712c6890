//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`; no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! # Timeouts
//!
//! The server owns every deadline; the router and handlers never time
//! anything. A client gets [`Server::read_timeout`] to send its request
//! headers, and each request gets [`Server::request_timeout`] from dispatch
//! to response before it is answered with `503`. A connection with no
//! request in flight for [`Server::idle_timeout`] is closed.
//!
//! On shutdown every open connection is told to finish: an idle keep-alive
//! connection closes at once, a busy one after its current response.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ApiError, Error};
use crate::response::IntoResponse;
use crate::router::{Dispatcher, Router};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    limits: Limits,
}

#[derive(Clone, Copy, Debug)]
struct Limits {
    read: Duration,
    request: Duration,
    idle: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: SocketAddr) -> Self {
        Self {
            addr,
            listener: None,
            limits: Limits {
                read: DEFAULT_TIMEOUT,
                request: DEFAULT_TIMEOUT,
                idle: DEFAULT_IDLE_TIMEOUT,
            },
        }
    }

    /// Serves on an already-bound listener, e.g. one bound to port `0`.
    pub fn from_listener(listener: TcpListener) -> Result<Self, Error> {
        let addr = listener.local_addr()?;
        Ok(Self { listener: Some(listener), ..Self::bind(addr) })
    }

    /// How long a connection may take to deliver a request's headers.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.limits.read = timeout;
        self
    }

    /// How long one request may take from dispatch to response.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.limits.request = timeout;
        self
    }

    /// How long a connection may sit with no request in flight before it is
    /// closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.limits.idle = timeout;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on a process signal.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(self.addr)
                .await
                .map_err(|source| Error::Bind { addr: self.addr, source })?,
        };
        let dispatcher = router.into_dispatcher();
        let limits = self.limits;

        info!(addr = %self.addr, "itembox listening");

        // Every spawned connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();
        // Tells connection tasks to stop taking new requests.
        let (drain_tx, drain_rx) = watch::channel(());

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(open = tasks.len(), "shutdown signal received, draining connections");
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
                    debug!(peer = %remote_addr, "connection accepted");

                    tasks.spawn(serve_connection(
                        stream,
                        remote_addr,
                        dispatcher.clone(),
                        limits,
                        drain_rx.clone(),
                    ));
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        drain_tx.send_replace(());
        while tasks.join_next().await.is_some() {}

        info!("itembox stopped");
        Ok(())
    }
}

/// HTTP/1.1 and HTTP/2, whichever the client speaks.
fn conn_builder(read_timeout: Duration) -> ConnBuilder<TokioExecutor> {
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout)
        .half_close(true);
    builder
}

/// Drives one connection until the client leaves, it goes idle, or the
/// server drains.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    limits: Limits,
    mut drain: watch::Receiver<()>,
) {
    let activity = Arc::new(Activity::new());

    // Called once per request on the connection.
    let svc = {
        let activity = Arc::clone(&activity);
        service_fn(move |req| {
            let dispatcher = dispatcher.clone();
            let busy = activity.begin();
            async move {
                let res = handle(dispatcher, req, limits.request).await;
                drop(busy);
                res
            }
        })
    };

    let builder = conn_builder(limits.read);
    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    error!(%peer, "connection error: {e}");
                }
                break;
            }
            _ = drain.changed(), if !closing => {
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
            () = activity.idle_for(limits.idle), if !closing => {
                debug!(%peer, idle_timeout = ?limits.idle, "closing idle connection");
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    }
}

/// Request bookkeeping for one connection, for the idle timeout.
struct Activity {
    in_flight: AtomicUsize,
    last_done: Mutex<Instant>,
}

/// Marks a request in flight until dropped.
struct Busy(Arc<Activity>);

impl Activity {
    fn new() -> Self {
        Self { in_flight: AtomicUsize::new(0), last_done: Mutex::new(Instant::now()) }
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Busy(Arc::clone(self))
    }

    /// Resolves once no request has been in flight for `timeout`.
    async fn idle_for(&self, timeout: Duration) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(timeout).await;
                continue;
            }
            let deadline = *self.last_done.lock().unwrap_or_else(PoisonError::into_inner) + timeout;
            if deadline <= Instant::now() {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        *self.0.last_done.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reads the body, then dispatches under the request deadline.
///
/// Never returns an error to hyper: every failure here is answered.
async fn handle(
    dispatcher: Dispatcher,
    req: hyper::Request<Incoming>,
    request_timeout: Duration,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {e}");
            let res = ApiError::bad_request("failed to read request body").into_response();
            return Ok(res.into_inner());
        }
    };
    let req = http::Request::from_parts(parts, body);

    let res = match tokio::time::timeout(request_timeout, dispatcher.dispatch(req)).await {
        Ok(res) => res,
        Err(_) => {
            warn!(?request_timeout, "request timed out");
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "request timed out").into_response()
        }
    };
    Ok(res.into_inner())
}

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
    use tokio::task::JoinHandle;

    use crate::request::Request;

    use super::*;

    const CLOSE: &str = "host: test\r\nconnection: close\r\n\r\n";

    type Running = JoinHandle<Result<(), Error>>;

    fn start(server: Server, router: Router) -> (SocketAddr, oneshot::Sender<()>, Running) {
        let addr = server.addr;
        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(server.serve_with_shutdown(router, async {
            let _ = stopped.await;
        }));
        (addr, stop, running)
    }

    async fn listen() -> Server {
        Server::from_listener(TcpListener::bind("127.0.0.1:0").await.unwrap()).unwrap()
    }

    async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    /// Reads one bodiless response off a kept-alive connection.
    async fn read_head(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-response");
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(buf).unwrap()
    }

    fn no_content() -> Router {
        Router::new().get("/", |_req: Request| async { StatusCode::NO_CONTENT })
    }

    #[tokio::test]
    async fn slow_handlers_are_cut_off_with_503() {
        let router = Router::new().get("/slow", |_req: Request| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        });
        let server = listen().await.request_timeout(Duration::from_millis(50));
        let (addr, stop, running) = start(server, router);

        let res = roundtrip(addr, &format!("GET /slow HTTP/1.1\r\n{CLOSE}")).await;
        assert!(res.starts_with("HTTP/1.1 503"), "{res}");
        assert!(res.ends_with(r#"{"error":"request timed out"}"#), "{res}");

        stop.send(()).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn truncated_body_is_400() {
        let router = Router::new().post("/items", |_req: Request| async { StatusCode::CREATED });
        let (addr, stop, running) = start(listen().await, router);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /items HTTP/1.1\r\nhost: test\r\ncontent-length: 100\r\n\r\nshort")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let res = String::from_utf8(buf).unwrap();

        assert!(res.starts_with("HTTP/1.1 400"), "{res}");
        assert!(res.ends_with(r#"{"error":"failed to read request body"}"#), "{res}");

        stop.send(()).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_keep_alive_connections_do_not_block_shutdown() {
        let server = listen().await.read_timeout(Duration::from_secs(60));
        let (addr, stop, running) = start(server, no_content());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.starts_with("HTTP/1.1 204"), "{head}");

        stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("shutdown waited on an idle connection")
            .unwrap()
            .unwrap();

        let mut rest = [0u8; 64];
        assert_eq!(stream.read(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn idle_connections_are_closed_after_the_idle_timeout() {
        let server = listen().await.idle_timeout(Duration::from_millis(100));
        let (addr, stop, running) = start(server, no_content());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
        read_head(&mut stream).await;

        let mut rest = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut rest))
            .await
            .expect("idle connection was left open")
            .unwrap();
        assert_eq!(n, 0);

        stop.send(()).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let err = Server::bind(addr)
            .serve_with_shutdown(Router::new(), std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Bind { addr: a, .. } if a == addr));
    }
}
