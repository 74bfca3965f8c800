//! Cancellation on Ctrl+C.
//!
//! [`ShutdownCoordinator`] owns the root [`CancellationToken`] handed to the export and
//! reimport pipelines. Requesting shutdown cancels it; every wait in the concurrency
//! layer observes the token and unwinds, releasing its permits on the way out.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinator shared between `main` and the commands.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Owner of the process-wide cancellation token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Fresh coordinator behind an [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Root token; cancelled once shutdown is requested.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown. Idempotent.
    pub fn request_shutdown(&self) {
        self.token.cancel();
    }

    /// Request shutdown on the first Ctrl+C.
    pub fn listen_for_ctrl_c(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl+C received, cancelling outstanding work");
                    coordinator.request_shutdown();
                }
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
        })
    }
}
