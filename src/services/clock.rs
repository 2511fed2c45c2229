//! Injectable clock for every delay the engine waits on

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source of delays. Production uses tokio's timer; tests substitute a clock
/// that records the requested durations and returns at once.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep unless shutdown is requested first. Returns `false` if cancelled.
pub async fn sleep_or_cancel(
    clock: &dyn Clock,
    shutdown: &CancellationToken,
    duration: Duration,
) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = clock.sleep(duration) => true,
    }
}
