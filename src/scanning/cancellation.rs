//! Cancellation tokens for discovery tasks
//!
//! Scanners poll [`CancellationToken::is_cancelled`] before every oracle
//! call and race long waits (oracle requests, passphrase prompts) against
//! [`DiscoveryCancellation::cancelled`]. Cancellation is one-way: once
//! requested it cannot be reset, so a settled task never flips back.

use std::sync::Arc;

use tokio::sync::watch;

/// Generic cancellation token trait
pub trait CancellationToken: Send + Sync + std::fmt::Debug {
    /// Check if cancellation has been requested
    fn is_cancelled(&self) -> bool;

    /// Request cancellation of the operation
    fn cancel(&self);
}

/// Tokio watch-channel based token shared by every scanner of one task
#[derive(Debug, Clone)]
pub struct DiscoveryCancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl DiscoveryCancellation {
    /// Create a new, not yet cancelled token
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a pair of (token, handle) where the handle can be used to cancel
    pub fn create_pair() -> (Self, CancellationHandle) {
        let token = Self::new();
        let handle = CancellationHandle {
            sender: token.sender.clone(),
        };
        (token, handle)
    }

    /// Resolves once cancellation has been requested
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for DiscoveryCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken for DiscoveryCancellation {
    fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Handle for cancelling a discovery task from another context
///
/// Cheap to clone; the UI keeps one while the task's token travels into the
/// spawned scanners.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    /// Cancel the associated token; idempotent
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check if the token is cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}
