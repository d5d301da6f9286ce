//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and, on unix, SIGTERM are forwarded to the
//! [`ShutdownCoordinator`]. The first starts the drain; what later ones do
//! is the coordinator's second-signal policy.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownCoordinator;

/// Spawn the signal listener for the lifetime of the process.
pub fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = listen(&coordinator).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    })
}

#[cfg(unix)]
async fn listen(coordinator: &ShutdownCoordinator) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!(signal = "SIGINT", "Shutdown signal received");
            }
            _ = terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutdown signal received");
            }
        }
        coordinator.signal();
    }
}

#[cfg(not(unix))]
async fn listen(coordinator: &ShutdownCoordinator) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        tracing::info!(signal = "ctrl-c", "Shutdown signal received");
        coordinator.signal();
    }
}
