//! Events streamed by a running discovery task

use std::fmt;
use std::sync::Arc;

use blake2::{Blake2b, Digest};
use digest::consts::U32;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::catalogue::{ScriptKind, WalletTypeId};
use crate::scanning::{Candidate, Classification, PassphraseRequest, ScanStage, ScanStep};

type Blake2b256 = Blake2b<U32>;

/// Progress of a task, emitted on every scanner step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryProgress {
    /// Candidates classified so far across all wallet types
    pub examined: u64,
    pub wallet_type: WalletTypeId,
    pub label: &'static str,
    pub index: u32,
    pub stage: ScanStage,
}

impl DiscoveryProgress {
    pub(crate) fn from_step(step: &ScanStep, examined: u64) -> Self {
        Self {
            examined,
            wallet_type: step.wallet_type,
            label: step.label,
            index: step.index,
            stage: step.stage,
        }
    }
}

impl fmt::Display for DiscoveryProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} · #{}", self.label, self.index)
    }
}

/// A wallet the task decided to offer
///
/// Owns the private material of the candidate it came from; watch-only
/// wallets have none.
#[derive(Serialize)]
pub struct DiscoveredWallet {
    /// Stable id derived from public data only
    pub id: String,
    pub wallet_type: WalletTypeId,
    pub label: &'static str,
    pub derivation_path: Option<String>,
    /// Account (or synthetic) index within the wallet type
    pub account: u32,
    pub script: Option<ScriptKind>,
    pub extended_public_key: Option<String>,
    pub first_address: String,
    pub activity: Classification,
    #[serde(skip)]
    private_key: Option<Zeroizing<String>>,
}

impl DiscoveredWallet {
    pub(crate) fn from_candidate(candidate: Candidate) -> Self {
        let label = candidate.label();
        let activity = candidate.classification();
        let mut material = candidate.into_material();
        let private_key = material.take_private_key();
        let first_address = material.first_address().unwrap_or_default().to_string();

        let id = wallet_id(
            material.wallet_type,
            material.derivation_path.as_deref(),
            &first_address,
        );

        Self {
            id,
            wallet_type: material.wallet_type,
            label,
            derivation_path: material.derivation_path.take(),
            account: material.index,
            script: material.script,
            extended_public_key: material.extended_public_key.take(),
            first_address,
            activity,
            private_key,
        }
    }

    /// Account xprv or WIF, for handing to wallet storage
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_ref().map(|key| key.as_str())
    }

    pub fn is_watch_only(&self) -> bool {
        self.private_key.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.activity == Classification::Active
    }
}

impl fmt::Debug for DiscoveredWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredWallet")
            .field("id", &self.id)
            .field("wallet_type", &self.wallet_type)
            .field("derivation_path", &self.derivation_path)
            .field("first_address", &self.first_address)
            .field("activity", &self.activity)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for DiscoveredWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.first_address)?;
        if let Some(path) = &self.derivation_path {
            write!(f, " ({})", path)?;
        }
        Ok(())
    }
}

/// Hex BLAKE2b-256 over wallet type, path and first address
pub fn wallet_id(wallet_type: WalletTypeId, derivation_path: Option<&str>, first_address: &str) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(b"wallet_discovery.wallet_id");
    for part in [
        wallet_type.as_str(),
        derivation_path.unwrap_or(""),
        first_address,
    ] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// What a task reports while it runs
#[derive(Debug)]
pub enum DiscoveryEvent {
    Progress(DiscoveryProgress),
    /// Emitted exactly once per wallet, in discovery order
    WalletFound(Arc<DiscoveredWallet>),
    /// The task is suspended until the request is answered or dropped
    PassphraseNeeded(PassphraseRequest),
}
