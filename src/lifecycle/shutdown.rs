//! Signal handling for graceful shutdown

use tracing::{debug, warn};

/// Waits for a termination request from the OS
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for SIGTERM or SIGINT
    #[cfg(unix)]
    pub async fn wait(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(?e, "failed to register signal handlers, falling back to ctrl-c");
                    return wait_ctrl_c().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
        }
    }

    /// Wait for Ctrl+C / Ctrl+Break
    #[cfg(not(unix))]
    pub async fn wait(&self) {
        wait_ctrl_c().await
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => debug!("received ctrl-c"),
        Err(e) => {
            // Without a signal source the host can only end via the exit combination
            warn!(?e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}
