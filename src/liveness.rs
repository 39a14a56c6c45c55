//! Cancellation signal consumed by the rotation task.
//!
//! The counter never owns the lifecycle of its signal. It only asks whether
//! the signal has fired and waits for it to fire.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// External liveness signal governing a counter's rotation task.
///
/// Once triggered a signal must stay triggered: every later call to
/// [`cancelled`](Liveness::cancelled) resolves immediately and
/// [`is_cancelled`](Liveness::is_cancelled) keeps returning `true`.
#[async_trait]
pub trait Liveness: Send + Sync + 'static {
    /// Returns `true` once the signal has been triggered.
    fn is_cancelled(&self) -> bool;

    /// Resolves once the signal has been triggered.
    async fn cancelled(&self);
}

#[async_trait]
impl Liveness for CancellationToken {
    #[inline]
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }

    async fn cancelled(&self) {
        CancellationToken::cancelled(self).await;
    }
}
