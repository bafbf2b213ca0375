//! Graceful shutdown coordination.
//!
//! A single broadcast channel fans the shutdown signal out to every
//! subsystem; the control loop selects on its receiver alongside the
//! record channel.

use tokio::signal;
use tokio::sync::broadcast;

/// Coordinates shutdown across the node's tasks.
///
/// Subsystems call [`subscribe`] for a receiver and `select!` on it.
/// Shutdown fires either programmatically ([`shutdown`]) or from an OS
/// signal ([`wait_for_signal`]).
///
/// [`subscribe`]: ShutdownController::subscribe
/// [`shutdown`]: ShutdownController::shutdown
/// [`wait_for_signal`]: ShutdownController::wait_for_signal
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
