//! Static catalogue of the wallet types the discovery engine knows how to derive
//!
//! Every entry is a [`WalletTypeDescriptor`]: a closed description of one
//! derivation scheme (path template or single-key mode, script/address
//! encoding, gap limit and the policy for offering an unused first
//! candidate). The set is fixed configuration and does not depend on the
//! secret being imported.

use std::collections::HashMap;
use std::fmt;

use bitcoin::Network;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::secret::SecretKind;

/// Stable identifier of a wallet type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTypeId {
    HdSegwitBech32,
    HdSegwitP2sh,
    HdLegacyP2pkh,
    HdTaproot,
    HdLegacyBreadwallet,
    SegwitBech32,
    SegwitP2sh,
    LegacyP2pkh,
    WatchOnlyXpub,
    WatchOnlyAddress,
}

impl WalletTypeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTypeId::HdSegwitBech32 => "hd_segwit_bech32",
            WalletTypeId::HdSegwitP2sh => "hd_segwit_p2sh",
            WalletTypeId::HdLegacyP2pkh => "hd_legacy_p2pkh",
            WalletTypeId::HdTaproot => "hd_taproot",
            WalletTypeId::HdLegacyBreadwallet => "hd_legacy_breadwallet",
            WalletTypeId::SegwitBech32 => "segwit_bech32",
            WalletTypeId::SegwitP2sh => "segwit_p2sh",
            WalletTypeId::LegacyP2pkh => "legacy_p2pkh",
            WalletTypeId::WatchOnlyXpub => "watch_only_xpub",
            WalletTypeId::WatchOnlyAddress => "watch_only_address",
        }
    }
}

impl fmt::Display for WalletTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output script an address is encoded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Pay to public key hash, `1…`
    P2pkh,
    /// P2WPKH nested in P2SH, `3…`
    P2shP2wpkh,
    /// Native segwit v0, `bc1q…`
    P2wpkh,
    /// Taproot key-path, `bc1p…`
    P2tr,
}

impl ScriptKind {
    /// Whether the script commits to a compressed public key only
    pub fn requires_compressed_key(&self) -> bool {
        !matches!(self, ScriptKind::P2pkh)
    }
}

/// How candidates of a wallet type are derived from the secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationScheme {
    /// BIP44-style account branch `m/purpose'/coin'/account'`; the scan index is the account
    AccountBranch { purpose: u32 },
    /// A single hardened branch without an account level (Breadwallet `m/0'`)
    FixedBranch { path: &'static str },
    /// One private key used directly, no derivation
    SingleKey,
    /// Account-level extended public key (watch-only)
    ExtendedPublicKey,
    /// A single address (watch-only)
    SingleAddress,
}

impl DerivationScheme {
    /// Hierarchical schemes walk indices with gap-limit termination
    pub fn is_hd(&self) -> bool {
        matches!(
            self,
            DerivationScheme::AccountBranch { .. }
                | DerivationScheme::FixedBranch { .. }
                | DerivationScheme::ExtendedPublicKey
        )
    }
}

/// What to do with the first candidate of a scheme when it has no history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnusedPolicy {
    /// Offer it anyway, emitted as soon as it is classified
    Always,
    /// Offer it only if the whole task found no active wallet; emitted at settlement
    Fallback,
    /// Never offer unused candidates
    Never,
}

/// Catalogue entry describing one derivation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletTypeDescriptor {
    pub id: WalletTypeId,
    /// Human readable label shown next to discovered wallets
    pub label: &'static str,
    pub scheme: DerivationScheme,
    /// Address encoding; `None` when it is carried by the secret itself
    /// (SLIP-132 version bytes of an extended key, or a plain address)
    pub script: Option<ScriptKind>,
    /// Secret kinds this wallet type can be derived from
    pub applies_to: &'static [SecretKind],
    /// Primary types are tried even when the caller does not ask to search every type
    pub primary: bool,
    /// Consecutive non-active candidates after which scanning stops
    pub gap_limit: u32,
    /// Hard upper bound on scanned indices
    pub max_index: u32,
    /// Whether a BIP39 passphrase participates in the seed
    pub accepts_seed_passphrase: bool,
    pub unused_policy: UnusedPolicy,
}

impl WalletTypeDescriptor {
    /// BIP44 coin type for a network
    pub fn coin_type(network: Network) -> u32 {
        match network {
            Network::Bitcoin => 0,
            _ => 1,
        }
    }

    /// Derivation path of candidate `index`, if the scheme has one
    pub fn path_for(&self, index: u32, network: Network) -> Option<String> {
        match self.scheme {
            DerivationScheme::AccountBranch { purpose } => Some(format!(
                "m/{}'/{}'/{}'",
                purpose,
                Self::coin_type(network),
                index
            )),
            DerivationScheme::FixedBranch { path } => Some(path.to_string()),
            DerivationScheme::SingleKey
            | DerivationScheme::ExtendedPublicKey
            | DerivationScheme::SingleAddress => None,
        }
    }

    pub fn applies_to(&self, kind: SecretKind) -> bool {
        self.applies_to.contains(&kind)
    }

    /// Number of indices the scanner may visit
    pub fn scan_bound(&self) -> u32 {
        if self.scheme.is_hd() {
            self.max_index.max(1)
        } else {
            1
        }
    }
}

const MNEMONIC: &[SecretKind] = &[SecretKind::Mnemonic];
const PRIVATE_KEY: &[SecretKind] = &[SecretKind::Wif, SecretKind::EncryptedKey];
const EXTENDED_PUBLIC_KEY: &[SecretKind] = &[SecretKind::ExtendedPublicKey];
const ADDRESS: &[SecretKind] = &[SecretKind::Address];

const ACCOUNT_GAP_LIMIT: u32 = 1;
const MAX_ACCOUNTS: u32 = 20;

lazy_static! {
    static ref CATALOGUE: Vec<WalletTypeDescriptor> = vec![
        WalletTypeDescriptor {
            id: WalletTypeId::HdSegwitBech32,
            label: "HD SegWit (BIP84 Bech32 Native)",
            scheme: DerivationScheme::AccountBranch { purpose: 84 },
            script: Some(ScriptKind::P2wpkh),
            applies_to: MNEMONIC,
            primary: true,
            gap_limit: ACCOUNT_GAP_LIMIT,
            max_index: MAX_ACCOUNTS,
            accepts_seed_passphrase: true,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::HdSegwitP2sh,
            label: "HD SegWit (BIP49 P2SH)",
            scheme: DerivationScheme::AccountBranch { purpose: 49 },
            script: Some(ScriptKind::P2shP2wpkh),
            applies_to: MNEMONIC,
            primary: false,
            gap_limit: ACCOUNT_GAP_LIMIT,
            max_index: MAX_ACCOUNTS,
            accepts_seed_passphrase: true,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::HdLegacyP2pkh,
            label: "HD Legacy (BIP44 P2PKH)",
            scheme: DerivationScheme::AccountBranch { purpose: 44 },
            script: Some(ScriptKind::P2pkh),
            applies_to: MNEMONIC,
            primary: false,
            gap_limit: ACCOUNT_GAP_LIMIT,
            max_index: MAX_ACCOUNTS,
            accepts_seed_passphrase: true,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::HdTaproot,
            label: "HD Taproot (BIP86 P2TR)",
            scheme: DerivationScheme::AccountBranch { purpose: 86 },
            script: Some(ScriptKind::P2tr),
            applies_to: MNEMONIC,
            primary: false,
            gap_limit: ACCOUNT_GAP_LIMIT,
            max_index: MAX_ACCOUNTS,
            accepts_seed_passphrase: true,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::HdLegacyBreadwallet,
            label: "HD Legacy Breadwallet (P2PKH)",
            scheme: DerivationScheme::FixedBranch { path: "m/0'" },
            script: Some(ScriptKind::P2pkh),
            applies_to: MNEMONIC,
            primary: false,
            gap_limit: ACCOUNT_GAP_LIMIT,
            max_index: 1,
            accepts_seed_passphrase: false,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::SegwitBech32,
            label: "SegWit (P2WPKH)",
            scheme: DerivationScheme::SingleKey,
            script: Some(ScriptKind::P2wpkh),
            applies_to: PRIVATE_KEY,
            primary: true,
            gap_limit: 1,
            max_index: 1,
            accepts_seed_passphrase: false,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::SegwitP2sh,
            label: "SegWit (P2SH-P2WPKH)",
            scheme: DerivationScheme::SingleKey,
            script: Some(ScriptKind::P2shP2wpkh),
            applies_to: PRIVATE_KEY,
            primary: true,
            gap_limit: 1,
            max_index: 1,
            accepts_seed_passphrase: false,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::LegacyP2pkh,
            label: "Legacy (P2PKH)",
            scheme: DerivationScheme::SingleKey,
            script: Some(ScriptKind::P2pkh),
            applies_to: PRIVATE_KEY,
            primary: true,
            gap_limit: 1,
            max_index: 1,
            accepts_seed_passphrase: false,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::WatchOnlyXpub,
            label: "Watch-only (extended public key)",
            scheme: DerivationScheme::ExtendedPublicKey,
            script: None,
            applies_to: EXTENDED_PUBLIC_KEY,
            primary: true,
            gap_limit: 1,
            max_index: 1,
            accepts_seed_passphrase: false,
            unused_policy: UnusedPolicy::Always,
        },
        WalletTypeDescriptor {
            id: WalletTypeId::WatchOnlyAddress,
            label: "Watch-only (address)",
            scheme: DerivationScheme::SingleAddress,
            script: None,
            applies_to: ADDRESS,
            primary: true,
            gap_limit: 1,
            max_index: 1,
            accepts_seed_passphrase: false,
            unused_policy: UnusedPolicy::Always,
        },
    ];
    static ref BY_ID: HashMap<WalletTypeId, usize> = CATALOGUE
        .iter()
        .enumerate()
        .map(|(position, descriptor)| (descriptor.id, position))
        .collect();
}

/// Every known wallet type, in the order discovery tries them
pub fn catalogue() -> &'static [WalletTypeDescriptor] {
    &CATALOGUE
}

/// Look up a descriptor by id
pub fn descriptor(id: WalletTypeId) -> &'static WalletTypeDescriptor {
    // every WalletTypeId has exactly one catalogue entry
    &CATALOGUE[BY_ID[&id]]
}

/// Wallet types to try for a secret kind
///
/// Without `search_all_account_types` only primary types are returned.
pub fn descriptors_for(kind: SecretKind, search_all_account_types: bool) -> Vec<WalletTypeDescriptor> {
    CATALOGUE
        .iter()
        .filter(|descriptor| descriptor.applies_to(kind))
        .filter(|descriptor| search_all_account_types || descriptor.primary)
        .copied()
        .collect()
}
