//! Callback-style observer for discovery tasks
//!
//! The task itself only produces [`DiscoveryEvent`](super::DiscoveryEvent)s.
//! A [`DiscoveryObserver`] adapts them into the callback contract UI code
//! usually wants: progress, wallet found, and an async passphrase prompt.

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::discovery::events::{DiscoveredWallet, DiscoveryProgress};

/// The user dismissed a passphrase prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Passphrase prompt rejected")]
pub struct PromptRejected;

/// Receives the events of one task
///
/// All methods have defaults, so an observer only implements what it shows.
/// The default prompt rejects, which skips the wallet types that need it.
#[async_trait]
pub trait DiscoveryObserver: Send + Sync {
    /// Called at least once per classified candidate
    fn on_progress(&self, _progress: &DiscoveryProgress) {}

    /// Called exactly once per discovered wallet, before the task settles
    fn on_wallet_found(&self, _wallet: &DiscoveredWallet) {}

    /// Ask the user for a passphrase
    ///
    /// Returning `Err(PromptRejected)` skips the wallet types that need it;
    /// it does not cancel the task.
    async fn on_passphrase_needed(
        &self,
        _title: &str,
        _subtitle: &str,
    ) -> Result<Zeroizing<String>, PromptRejected> {
        Err(PromptRejected)
    }
}

/// Observer that ignores everything and rejects every prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl DiscoveryObserver for NoopObserver {}
