//! Import text parsing and classification
//!
//! An [`ImportSecret`] is created once per discovery task from the text the
//! user typed or scanned. It is immutable, holds the normalised text in a
//! zeroizing buffer and is dropped (and wiped) when the task settles.

use std::fmt;

use bip39::{Language, Mnemonic};
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, PrivateKey};
use blake2::{Blake2b, Digest};
use digest::consts::U32;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::catalogue::WalletTypeDescriptor;
use crate::derivation::{bip38, extended_key};

type Blake2b256 = Blake2b<U32>;

const FINGERPRINT_DOMAIN: &[u8] = b"wallet_discovery.secret_fingerprint";

/// What the import text turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// BIP39 English mnemonic with a valid checksum
    Mnemonic,
    /// Wallet import format private key
    Wif,
    /// BIP38 password-protected private key (`6P…`)
    EncryptedKey,
    /// Account-level xpub/ypub/zpub (watch-only)
    ExtendedPublicKey,
    /// Plain address (watch-only)
    Address,
    /// Nothing we can derive from
    Unknown,
}

impl SecretKind {
    fn tag(&self) -> u8 {
        match self {
            SecretKind::Mnemonic => 1,
            SecretKind::Wif => 2,
            SecretKind::EncryptedKey => 3,
            SecretKind::ExtendedPublicKey => 4,
            SecretKind::Address => 5,
            SecretKind::Unknown => 0,
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretKind::Mnemonic => write!(f, "mnemonic"),
            SecretKind::Wif => write!(f, "WIF private key"),
            SecretKind::EncryptedKey => write!(f, "BIP38 encrypted key"),
            SecretKind::ExtendedPublicKey => write!(f, "extended public key"),
            SecretKind::Address => write!(f, "address"),
            SecretKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Stable digest identifying one secret within a task
///
/// Keys the passphrase cache so a protected secret is unlocked at most once.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretFingerprint([u8; 32]);

impl fmt::Debug for SecretFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretFingerprint({}…)", hex::encode(&self.0[..4]))
    }
}

/// User-supplied import text, parsed
pub struct ImportSecret {
    text: Zeroizing<String>,
    kind: SecretKind,
    passphrase_protected: bool,
    fingerprint: SecretFingerprint,
}

impl ImportSecret {
    /// Classify `text`
    ///
    /// `seed_passphrase_expected` marks a mnemonic as protected by a BIP39
    /// passphrase the user will be asked for. BIP38 keys are always protected.
    pub fn parse(text: &str, network: Network, seed_passphrase_expected: bool) -> Self {
        let trimmed = Zeroizing::new(text.trim().to_string());
        let (kind, normalised) = classify(&trimmed, network);

        let passphrase_protected = match kind {
            SecretKind::EncryptedKey => true,
            SecretKind::Mnemonic => seed_passphrase_expected,
            _ => false,
        };

        let mut hasher = Blake2b256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update([kind.tag()]);
        hasher.update(normalised.as_bytes());
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&hasher.finalize());

        Self {
            text: normalised,
            kind,
            passphrase_protected,
            fingerprint: SecretFingerprint(fingerprint),
        }
    }

    pub fn kind(&self) -> SecretKind {
        self.kind
    }

    /// Whether at least one wallet type may be derivable
    pub fn is_valid(&self) -> bool {
        self.kind != SecretKind::Unknown
    }

    pub fn is_passphrase_protected(&self) -> bool {
        self.passphrase_protected
    }

    pub fn fingerprint(&self) -> SecretFingerprint {
        self.fingerprint
    }

    /// Whether deriving `descriptor` needs the passphrase
    pub fn requires_passphrase_for(&self, descriptor: &WalletTypeDescriptor) -> bool {
        match self.kind {
            SecretKind::EncryptedKey => true,
            SecretKind::Mnemonic => self.passphrase_protected && descriptor.accepts_seed_passphrase,
            _ => false,
        }
    }

    /// The normalised secret text
    pub(crate) fn expose(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for ImportSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportSecret")
            .field("kind", &self.kind)
            .field("passphrase_protected", &self.passphrase_protected)
            .field("text", &"<redacted>")
            .finish()
    }
}

fn classify(text: &str, network: Network) -> (SecretKind, Zeroizing<String>) {
    let verbatim = || Zeroizing::new(text.to_string());

    if text.is_empty() {
        return (SecretKind::Unknown, verbatim());
    }
    if bip38::is_encrypted_key(text) {
        return (SecretKind::EncryptedKey, verbatim());
    }
    if PrivateKey::from_wif(text).is_ok() {
        return (SecretKind::Wif, verbatim());
    }
    if extended_key::parse_extended_public_key(text).is_ok() {
        return (SecretKind::ExtendedPublicKey, verbatim());
    }
    if let Ok(address) = text.parse::<Address<NetworkUnchecked>>() {
        if address.is_valid_for_network(network) {
            return (SecretKind::Address, verbatim());
        }
    }

    let words = Zeroizing::new(
        text.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    );
    if Mnemonic::parse_in_normalized(Language::English, &words).is_ok() {
        return (SecretKind::Mnemonic, words);
    }

    (SecretKind::Unknown, verbatim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{descriptor, WalletTypeId};

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_detects_mnemonic_and_normalises_it() {
        let secret = ImportSecret::parse(
            "  Abandon abandon abandon abandon abandon abandon\nabandon abandon abandon abandon abandon   ABOUT ",
            Network::Bitcoin,
            false,
        );
        assert_eq!(secret.kind(), SecretKind::Mnemonic);
        assert_eq!(secret.expose(), MNEMONIC);
        assert!(!secret.is_passphrase_protected());

        let same = ImportSecret::parse(MNEMONIC, Network::Bitcoin, false);
        assert_eq!(secret.fingerprint(), same.fingerprint());
    }

    #[test]
    fn test_bad_checksum_is_unknown() {
        let secret = ImportSecret::parse(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
            Network::Bitcoin,
            false,
        );
        assert_eq!(secret.kind(), SecretKind::Unknown);
        assert!(!secret.is_valid());
    }

    #[test]
    fn test_detects_keys_and_watch_only_inputs() {
        let wif = ImportSecret::parse(
            "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn",
            Network::Bitcoin,
            false,
        );
        assert_eq!(wif.kind(), SecretKind::Wif);

        let encrypted = ImportSecret::parse(
            "6PRVWUbkzzsbcVac2qwfssoUJAN1Xhrg6bNk8J7Nzm5H7kxEbn2Nh2ZoGg",
            Network::Bitcoin,
            false,
        );
        assert_eq!(encrypted.kind(), SecretKind::EncryptedKey);
        assert!(encrypted.is_passphrase_protected());

        let zpub = ImportSecret::parse(
            "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs",
            Network::Bitcoin,
            false,
        );
        assert_eq!(zpub.kind(), SecretKind::ExtendedPublicKey);

        let address = ImportSecret::parse(
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu",
            Network::Bitcoin,
            false,
        );
        assert_eq!(address.kind(), SecretKind::Address);

        let wrong_network = ImportSecret::parse(
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu",
            Network::Testnet,
            false,
        );
        assert_eq!(wrong_network.kind(), SecretKind::Unknown);
    }

    #[test]
    fn test_empty_text_is_invalid() {
        let secret = ImportSecret::parse("   ", Network::Bitcoin, true);
        assert!(!secret.is_valid());
        assert!(!secret.is_passphrase_protected());
    }

    #[test]
    fn test_passphrase_requirement_per_wallet_type() {
        let secret = ImportSecret::parse(MNEMONIC, Network::Bitcoin, true);
        assert!(secret.requires_passphrase_for(descriptor(WalletTypeId::HdSegwitBech32)));
        assert!(!secret.requires_passphrase_for(descriptor(WalletTypeId::HdLegacyBreadwallet)));

        let unprotected = ImportSecret::parse(MNEMONIC, Network::Bitcoin, false);
        assert!(!unprotected.requires_passphrase_for(descriptor(WalletTypeId::HdSegwitBech32)));
    }

    #[test]
    fn test_debug_redacts_text() {
        let secret = ImportSecret::parse(MNEMONIC, Network::Bitcoin, false);
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("abandon"));
        assert!(rendered.contains("redacted"));
    }
}
