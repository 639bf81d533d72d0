//! Shutdown signalling
//!
//! A [`ShutdownController`] flips a watch channel once; every
//! [`ShutdownReceiver`] observes the flip at its next suspension point.
//! [`spawn_signal_listener`] wires SIGINT and SIGTERM to the controller.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Sending side of the shutdown signal
///
/// Once sent the signal cannot be recalled.
#[derive(Clone, Debug)]
pub struct ShutdownController(Arc<watch::Sender<bool>>);

/// Receiving end of the shutdown signal
#[derive(Clone, Debug)]
pub struct ShutdownReceiver(watch::Receiver<bool>);

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub fn subscribe(&self) -> ShutdownReceiver {
        ShutdownReceiver(self.0.subscribe())
    }

    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownReceiver {
    /// A receiver that is never signalled
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown has been requested
    ///
    /// A dropped controller is not a shutdown request; the future then stays
    /// pending forever.
    pub async fn recv(&mut self) {
        if self.0.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Trigger `controller` on Ctrl-C, and on SIGTERM where available
pub fn spawn_signal_listener(controller: ShutdownController) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        controller.shutdown();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        },
        _ = async {
            match terminate.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        } => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_receivers_observe_shutdown() {
        let controller = ShutdownController::new();
        let mut a = controller.subscribe();
        let b = controller.subscribe();
        assert!(!a.is_shutdown());

        controller.shutdown();
        a.recv().await;
        assert!(a.is_shutdown());
        assert!(b.is_shutdown());
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_prior_shutdown() {
        let controller = ShutdownController::new();
        controller.shutdown();
        let mut late = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.recv())
            .await
            .expect("shutdown already requested");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_controller_is_not_a_shutdown() {
        let mut rx = ShutdownController::new().subscribe();
        let waited = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(waited.is_err());
        assert!(!rx.is_shutdown());

        let mut never = ShutdownReceiver::never();
        assert!(tokio::time::timeout(Duration::from_secs(60), never.recv())
            .await
            .is_err());
    }
}
