//! Run-wide cancellation signal
//!
//! A clonable flag backed by a `watch` channel. Transports await
//! [`CancelSignal::cancelled`] alongside the in-flight process so an operator
//! interrupt terminates remote commands promptly.

use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation signal shared by every unit of work in a run
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a new signal (not cancelled)
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check if cancellation has been requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            // The sender lives as long as `self`, so this only errors if the
            // signal is torn down mid-wait; park forever in that case.
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
