//! Resettable broadcast cancellation.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// A broadcastable, idempotent "stop" primitive shared by every blocking loop
/// of one component.
///
/// Waiters obtain the current [`CancellationToken`] through [`wait`](Self::wait).
/// [`reset`](Self::reset) swaps in a fresh token, so handles taken before the
/// reset keep observing the old fired state.
#[derive(Debug, Default)]
pub struct CancellationSignal {
    token: Mutex<CancellationToken>,
}

impl CancellationSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        Self {
            token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Fire the signal. Firing an already fired signal is a no-op.
    pub fn close(&self) {
        self.token.lock().cancel();
    }

    /// Handle that becomes ready once [`close`](Self::close) is called.
    pub fn wait(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    /// Wait until the signal fires.
    pub async fn cancelled(&self) {
        let token = self.wait();
        token.cancelled().await;
    }

    /// Whether the signal is currently fired.
    pub fn is_closed(&self) -> bool {
        self.token.lock().is_cancelled()
    }

    /// Return the signal to the unfired state.
    ///
    /// Only a fired token is replaced; resetting an unfired signal keeps the
    /// handles already given out valid.
    pub fn reset(&self) {
        let mut token = self.token.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}
