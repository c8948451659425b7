//! Process-wide shutdown signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// One shared shutdown signal.
///
/// Triggering is idempotent: only the first call has any effect, so the
/// listener waiting on it is closed exactly once. Connections get child
/// scopes, so cancelling a single connection never reaches the listener.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Create an untriggered coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger shutdown. Returns `true` for the call that actually triggered it.
    pub fn trigger(&self, reason: &str) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress (ignoring: {})", reason);
            return false;
        }
        tracing::info!("Shutting down: {}", reason);
        self.token.cancel();
        true
    }

    /// Whether shutdown has been triggered
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is triggered
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// A cancellation scope for one connection.
    ///
    /// It is cancelled by shutdown, and cancelling it affects nothing else.
    pub fn connection_scope(&self) -> CancellationToken {
        self.token.child_token()
    }
}
