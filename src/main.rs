//! kiosk-guard: host process for the kiosk keyboard guard
//!
//! Runs the guard the way a kiosk application embeds it:
//! - Loads settings (defaults, optionally overlaid by a JSON file)
//! - Starts the guard, or continues unlocked if the hook cannot be installed
//! - Polls the exit flag each tick until the exit combination or a signal arrives

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kiosk_guard::lifecycle::{wait_for_exit, ShutdownSignal};
use kiosk_guard::{KeyboardGuard, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "kiosk-guard starting"
    );

    // Load configuration
    let settings = Settings::load();
    info!(
        config_path = ?settings.config_path,
        lock_enabled = settings.enable_keyboard_lock,
        "configuration loaded"
    );

    let guard = KeyboardGuard::new(settings.guard.clone())?;

    // Fail open: a kiosk that cannot be closed is worse than one that is unlocked
    let locked = if settings.enable_keyboard_lock {
        match guard.start() {
            Ok(()) => {
                info!("keyboard lock active");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to start keyboard guard");
                warn!("continuing without keyboard lock");
                false
            }
        }
    } else {
        info!("keyboard lock disabled by configuration");
        false
    };

    match serde_json::to_string(&guard.status()) {
        Ok(status) => info!(%status, "guard status"),
        Err(e) => warn!(?e, "failed to encode guard status"),
    }

    let shutdown = ShutdownSignal::new();

    tokio::select! {
        _ = wait_for_exit(|| guard.should_exit(), settings.poll_interval), if locked => {
            info!("closing on exit combination");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");
    guard.stop();

    info!("kiosk-guard stopped");

    Ok(())
}
