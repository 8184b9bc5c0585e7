use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Process-wide cooperative cancellation flag.
///
/// Clones share the same underlying token. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Logs `reason` and triggers. Holds no locks, so signal handler tasks can call it.
    pub fn request(&self, reason: &str) {
        log::info!("Shutdown requested: {}", reason);
        self.trigger();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Sleeps for `duration` unless shutdown fires first.
    ///
    /// Returns `true` when the full delay elapsed and `false` when it was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
