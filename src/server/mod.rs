// Server module entry point
// Explicit server lifecycle: bind, run until shutdown, drain

pub mod connection;
pub mod listener;
pub mod request_head;
pub mod shutdown;
pub mod signal;

// `loop` is a keyword, so the file is mounted under another name
#[path = "loop.rs"]
pub mod server_loop;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{AppState, Config};
use crate::logger;
use connection::ConnectionTracker;

pub use listener::create_listener;
pub use shutdown::Shutdown;

/// A bound, not yet running, file server
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
    tracker: Arc<ConnectionTracker>,
}

impl Server {
    /// Bind the configured address
    ///
    /// Must be called from within a Tokio runtime. Fails with `AddrInUse`
    /// when the port is taken.
    pub fn bind(config: Config) -> io::Result<Self> {
        let addr = config
            .get_socket_addr()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let listener = create_listener(addr)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(AppState::new(config)),
            tracker: Arc::new(ConnectionTracker::default()),
        })
    }

    /// Actual bound address (resolves port 0)
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Serve until `shutdown` fires, then close the listener and wait for
    /// in-flight connections up to the configured shutdown timeout.
    pub async fn run(self, shutdown: Shutdown) {
        let drain_timeout = Duration::from_secs(self.state.config.performance.shutdown_timeout);

        server_loop::run_accept_loop(
            self.listener,
            self.state,
            Arc::clone(&self.tracker),
            shutdown,
        )
        .await;

        logger::log_shutdown_draining(self.tracker.active());
        let abandoned = self.tracker.wait_idle(drain_timeout).await;
        logger::log_shutdown_complete(abandoned);
    }

    /// Run on a background task and return a handle to stop it
    pub fn start(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let shutdown = Shutdown::new();
        let task = tokio::spawn(self.run(shutdown.clone()));

        ServerHandle {
            local_addr,
            shutdown,
            task,
        }
    }
}

/// Handle to a server started with [`Server::start`]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the server when triggered
    pub fn shutdown_token(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Trigger shutdown and wait for the server task to finish
    pub async fn stop(self) -> io::Result<()> {
        self.shutdown.trigger();
        self.wait().await
    }

    /// Wait for the server task to finish without triggering shutdown
    pub async fn wait(self) -> io::Result<()> {
        self.task.await.map_err(io::Error::other)
    }
}
