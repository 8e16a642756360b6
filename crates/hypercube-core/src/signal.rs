//! Manual-reset event for waking worker tasks

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use tokio::sync::Notify;

/// A flag that tasks can wait on until another task raises it
///
/// Once raised the signal stays raised until `reset`, so a notification sent
/// before anyone waits is not lost.
#[derive(Debug, Default)]
pub struct Signal {
    raised: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter
    pub fn notify(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Lower the signal
    pub fn reset(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Wait until the signal is raised
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until the signal is raised or the timeout elapses
    ///
    /// Returns true if the signal was raised.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}
