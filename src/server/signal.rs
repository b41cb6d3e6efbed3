// Signal handling module
//
// Bridges operator signals into the shutdown token:
// - SIGINT:  Graceful shutdown (Ctrl+C)
// - SIGTERM: Graceful shutdown

use super::shutdown::Shutdown;
use crate::logger;

/// Start signal handlers (Unix: SIGINT and SIGTERM)
///
/// Spawns a background task that triggers `shutdown` on the first signal.
#[cfg(unix)]
pub fn start_signal_handler(shutdown: Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(int), Ok(term)) => (int, term),
                (Err(e), _) | (_, Err(e)) => {
                    logger::log_error(&format!(
                        "Failed to register signal handlers: {e}, falling back to Ctrl+C only"
                    ));
                    wait_ctrl_c(shutdown).await;
                    return;
                }
            };

        let reason = tokio::select! {
            _ = sigint.recv() => "SIGINT received (Ctrl+C)",
            _ = sigterm.recv() => "SIGTERM received",
        };
        logger::log_shutdown_requested(reason);
        shutdown.trigger();
    });
}

/// Non-Unix fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(shutdown: Shutdown) {
    tokio::spawn(wait_ctrl_c(shutdown));
}

async fn wait_ctrl_c(shutdown: Shutdown) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            logger::log_shutdown_requested("Ctrl+C received");
            shutdown.trigger();
        }
        Err(e) => logger::log_error(&format!("Failed to listen for Ctrl+C: {e}")),
    }
}
