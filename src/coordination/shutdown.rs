//! Graceful Shutdown Handler
//!
//! A shared cancellation context. The control loop polls
//! `is_shutdown_requested` at each cycle boundary; background tasks await
//! `cancelled()` alongside their own work and stop at their next suspension
//! point. In-flight calls are never aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Where a shutdown request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / SIGTERM
    Interrupt,
    /// Requested by the application itself
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

pub struct GracefulShutdown {
    shutdown_requested: AtomicBool,
    stop_tx: watch::Sender<bool>,
    signal_tx: broadcast::Sender<ShutdownSignal>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (signal_tx, _) = broadcast::channel(8);
        Self {
            shutdown_requested: AtomicBool::new(false),
            stop_tx,
            signal_tx,
        }
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.signal_tx.subscribe()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.stop_tx.send_replace(true);
        let _ = self.signal_tx.send(signal);
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.stop_tx.subscribe();
        // Err means the sender is gone, which only happens when `self` is
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_request_is_sticky_and_idempotent() {
        let shutdown = GracefulShutdown::new();
        let mut rx = shutdown.subscribe();
        assert!(!shutdown.is_shutdown_requested());

        shutdown.request_shutdown(ShutdownSignal::Interrupt);
        shutdown.request_shutdown(ShutdownSignal::Requested);

        assert!(shutdown.is_shutdown_requested());
        assert_eq!(rx.recv().await.expect("signal"), ShutdownSignal::Interrupt);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiting_tasks() {
        let shutdown = Arc::new(GracefulShutdown::new());
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        shutdown.request_shutdown(ShutdownSignal::Requested);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finishes")
            .expect("task ok");
        // Already requested: returns immediately
        shutdown.cancelled().await;
    }
}
