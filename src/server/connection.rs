// Connection handling module
// Serves each accepted TCP connection on its own task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::request_head::{self, RequestHead, Rewind};
use super::shutdown::Shutdown;
use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Counts in-flight connections so shutdown can wait for them
#[derive(Default)]
pub struct ConnectionTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard(Arc::clone(self))
    }

    /// Wait until no connection is in flight or `timeout` elapses
    ///
    /// Returns the number of connections still active.
    pub async fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let active = self.active();
            if active == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.active();
            }
        }
    }
}

/// Decrements the tracker when the connection task ends, even on panic
struct ConnectionGuard(Arc<ConnectionTracker>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Handle a single connection in a spawned task.
///
/// The request head is read and checked first, within the configured read
/// timeout; a malformed head is answered here. A valid head is replayed into
/// hyper, which serves the one request (keep-alive off) and is shut down
/// gracefully when `shutdown` fires. Writing the response has no deadline.
pub fn spawn_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    tracker: &Arc<ConnectionTracker>,
    shutdown: Shutdown,
) {
    let guard = tracker.enter();
    logger::log_connection_accepted(&peer_addr);

    tokio::spawn(async move {
        let _guard = guard;
        let head_timeout = Duration::from_secs(state.config.performance.read_timeout);

        let head = tokio::select! {
            () = shutdown.wait() => return,
            res = tokio::time::timeout(head_timeout, request_head::read_head(&mut stream)) => res,
        };
        let prefix = match head {
            Ok(Ok(RequestHead::Complete(prefix))) => prefix,
            Ok(Ok(RequestHead::Invalid(status))) => {
                logger::log_warning(&format!("Malformed request from {peer_addr}: {status}"));
                let response = request_head::error_response(status);
                match request_head::write_response(&mut stream, response).await {
                    Ok(()) => request_head::linger(&mut stream).await,
                    Err(e) => logger::log_connection_error(&e),
                }
                return;
            }
            Ok(Ok(RequestHead::Closed)) => return,
            Ok(Err(e)) => {
                logger::log_connection_error(&e);
                return;
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Connection from {peer_addr} sent no request within {} seconds",
                    head_timeout.as_secs()
                ));
                return;
            }
        };

        let io = TokioIo::new(Rewind::new(prefix, stream));
        let mut builder = http1::Builder::new();
        builder
            .keep_alive(false)
            .timer(TokioTimer::new())
            .header_read_timeout(head_timeout);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| handler::handle_request(req, Arc::clone(&state), peer_addr)),
        );
        tokio::pin!(conn);

        let mut draining = false;
        let served = loop {
            tokio::select! {
                res = conn.as_mut() => break res,
                () = shutdown.wait(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        };

        match served {
            Ok(()) => {}
            Err(err) if err.is_parse() => {
                logger::log_warning(&format!("Malformed request from {peer_addr}: {err}"));
            }
            Err(err) => logger::log_connection_error(&err),
        }
    });
}
