// Server loop module
// Accepts connections until shutdown is requested

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::{spawn_connection, ConnectionTracker};
use super::shutdown::Shutdown;
use crate::config::AppState;
use crate::logger;

/// Pause after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Run the accept loop; the listener is closed when this returns
pub async fn run_accept_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    tracker: Arc<ConnectionTracker>,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            biased;

            () = shutdown.wait() => break,

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        spawn_connection(
                            stream,
                            peer_addr,
                            Arc::clone(&state),
                            &tracker,
                            shutdown.clone(),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    drop(listener);
}
