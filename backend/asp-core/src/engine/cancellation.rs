use std::sync::Arc;

use tokio::sync::watch;

/// Cancellation flag shared between the dispatcher and an engine worker.
///
/// Engines poll [`is_cancelled`](Self::is_cancelled) from a blocking thread;
/// the dispatcher awaits [`cancelled`](Self::cancelled). Setting the flag never
/// blocks, and once set it stays set.
#[derive(Debug, Clone)]
pub struct CancellationFlag {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close underneath us.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}
