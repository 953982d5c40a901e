//! Cooperative cancellation shared by every worker of a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Shared cancel signal.
///
/// Polling is a single atomic load. The token half lets waiters (permit
/// acquisition, the batcher) wake up as soon as cancellation happens.
/// Cancelling does not interrupt I/O that is already running.
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    flag: Arc<AtomicBool>,
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::debug!("scan cancellation requested");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_shared() {
        let controller = CancellationController::new();
        let clone = controller.clone();
        assert!(!clone.is_cancelled());

        controller.cancel();
        controller.cancel();

        assert!(clone.is_cancelled());
        // Already cancelled, so this resolves immediately.
        clone.cancelled().await;
    }
}
