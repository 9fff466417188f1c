//! Per-session interrupt signal
//!
//! A blocked lock wait must be abortable from outside, the way a signal
//! aborts an interruptible sleep. Each session owns an [`Interrupter`];
//! clones of it can be handed to other tasks, which call
//! [`Interrupter::raise`]. The next (or current) lock wait of that session
//! returns `Interrupted` and consumes the signal.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Interrupter {
    raised: Arc<watch::Sender<bool>>,
}

impl Interrupter {
    #[must_use]
    pub fn new() -> Self {
        let (raised, _) = watch::channel(false);
        Self {
            raised: Arc::new(raised),
        }
    }

    /// Deliver the signal
    pub fn raise(&self) {
        self.raised.send_replace(true);
    }

    /// Is a signal waiting to be consumed?
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.raised.borrow()
    }

    /// Consume a pending signal; returns whether there was one
    pub(crate) fn take(&self) -> bool {
        self.raised.send_replace(false)
    }

    /// Resolves once the signal is raised
    pub(crate) async fn raised(&self) {
        let mut rx = self.raised.subscribe();
        let closed = rx.wait_for(|raised| *raised).await.is_err();
        if closed {
            // The sender lives in `self`, so the channel cannot close under us.
            pending::<()>().await;
        }
    }
}

impl Default for Interrupter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_raise_and_take() {
        let interrupter = Interrupter::new();
        assert!(!interrupter.is_raised());

        interrupter.clone().raise();
        assert!(interrupter.is_raised());
        assert!(interrupter.take());
        assert!(!interrupter.is_raised());
        assert!(!interrupter.take());
    }

    #[tokio::test]
    async fn test_raised_resolves_immediately_when_pending() {
        let interrupter = Interrupter::new();
        interrupter.raise();
        tokio::time::timeout(Duration::from_secs(1), interrupter.raised())
            .await
            .expect("pending signal should resolve the wait");
    }

    #[tokio::test]
    async fn test_raised_wakes_waiter() {
        let interrupter = Interrupter::new();
        let remote = interrupter.clone();

        let waiter = tokio::spawn(async move { interrupter.raised().await });
        tokio::task::yield_now().await;
        remote.raise();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
