//! Shutdown coordination.
//!
//! A single process-wide flag that request handlers race their injected
//! delay against. Once triggered it stays triggered, so a handler that
//! subscribes after the signal still sees it.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable handle to the process-wide shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only errors if it was dropped mid-wait.
        if rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger `shutdown` on Ctrl+C, or SIGTERM on unix.
pub fn listen_for_signals(shutdown: Shutdown) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_wait_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let mut wait = task::spawn(shutdown.wait());

        assert_pending!(wait.poll());
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_late_waiter_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();

        let mut wait = task::spawn(shutdown.wait());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_clones_share_state() {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        let mut wait = task::spawn(handle.wait());
        assert_pending!(wait.poll());

        shutdown.trigger();
        assert!(handle.is_triggered());
        assert_ready!(wait.poll());
    }
}
