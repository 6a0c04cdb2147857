//! Cooperative cancellation.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A cancellation signal shared by everything working on one plan run.
///
/// Once fired it stays fired. Clones observe the same state, so firing from
/// any clone is visible to every in-flight check and every pending wait.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    /// Creates an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token, e.g. one owned by a host service.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Fires the signal. Idempotent.
    pub fn fire(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("cancellation signal fired");
        }
        self.token.cancel();
    }

    /// Returns `true` once the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the signal fires; immediately if it already has.
    pub fn fired(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Returns a signal that fires with this one but can also be fired on
    /// its own without affecting the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Returns the underlying token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_fired());
        signal.fire();
        assert!(clone.is_fired());
        signal.fire();
        assert!(signal.is_fired());
    }

    #[test]
    fn child_follows_parent_only() {
        let parent = CancellationSignal::new();
        let child = parent.child();
        child.fire();
        assert!(!parent.is_fired());

        let other = parent.child();
        parent.fire();
        assert!(other.is_fired());
    }

    #[tokio::test]
    async fn fired_resolves_after_fire() {
        let signal = CancellationSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.fired().await });
        signal.fire();
        handle.await.unwrap();
    }
}
