//! Graceful shutdown coordination via `CancellationToken`.
//!
//! SIGINT or SIGTERM cancels the token; the listener stops accepting and
//! drains in-flight requests, then the binary tears down the modules.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long in-flight requests may run after shutdown begins.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared shutdown signal for the listener and its owner.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has begun.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Cancel the token on SIGINT or SIGTERM.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = termination_signal() => {
                    info!("termination signal received, shutting down");
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        })
    }

    /// Fire the token and wait up to `timeout` for the server task.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        match tokio::time::timeout(timeout, server).await {
            Ok(Ok(())) => info!("listener drained"),
            Ok(Err(e)) => warn!(error = %e, "listener task failed"),
            Err(_) => warn!("drain timed out after {timeout:?}, abandoning in-flight requests"),
        }
    }
}

#[cfg(unix)]
async fn termination_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
