//! Derivation engine
//!
//! A pure function from (secret, passphrase, wallet type, index) to key
//! material and receive addresses. No I/O happens here; the candidate
//! scanner decides what to do with the result.
//!
//! Private material is returned inside [`Zeroizing`] buffers. Callers drop
//! [`DerivedKeyMaterial`] as soon as a candidate is classified unless it is
//! handed over to a discovered wallet.

pub mod address;
pub mod bip38;
pub mod extended_key;

use std::fmt;
use std::str::FromStr;

use bip39::{Language, Mnemonic};
use bitcoin::address::NetworkUnchecked;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Network, PrivateKey, PublicKey};
use zeroize::Zeroizing;

use crate::catalogue::{DerivationScheme, ScriptKind, WalletTypeDescriptor, WalletTypeId};
use crate::errors::DerivationError;
use crate::secret::{ImportSecret, SecretKind};

use self::bip38::Bip38Error;

/// Key material and addresses for one candidate
pub struct DerivedKeyMaterial {
    pub wallet_type: WalletTypeId,
    pub index: u32,
    pub derivation_path: Option<String>,
    pub script: Option<ScriptKind>,
    /// SLIP-132 encoded account public key, for HD and watch-only types
    pub extended_public_key: Option<String>,
    /// Receive addresses, first one is the wallet's canonical address
    pub addresses: Vec<String>,
    /// Account xprv or WIF; `None` for watch-only types
    private_key: Option<Zeroizing<String>>,
}

impl DerivedKeyMaterial {
    pub fn first_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }

    pub fn is_watch_only(&self) -> bool {
        self.private_key.is_none()
    }

    /// Move the private material out, leaving the candidate watch-only
    pub fn take_private_key(&mut self) -> Option<Zeroizing<String>> {
        self.private_key.take()
    }
}

impl fmt::Debug for DerivedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeyMaterial")
            .field("wallet_type", &self.wallet_type)
            .field("index", &self.index)
            .field("derivation_path", &self.derivation_path)
            .field("addresses", &self.addresses)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Stateless deriver bound to a network
#[derive(Clone)]
pub struct DerivationEngine {
    network: Network,
    address_count: u32,
    secp: Secp256k1<All>,
}

impl fmt::Debug for DerivationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationEngine")
            .field("network", &self.network)
            .field("address_count", &self.address_count)
            .finish()
    }
}

impl DerivationEngine {
    /// `address_count` receive addresses are derived per HD candidate (at least one)
    pub fn new(network: Network, address_count: u32) -> Self {
        Self {
            network,
            address_count: address_count.max(1),
            secp: Secp256k1::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Derive candidate `index` of `descriptor` from `secret`
    ///
    /// Format problems are reported before a missing passphrase, so a secret
    /// a wallet type cannot use never triggers a prompt.
    pub fn derive(
        &self,
        secret: &ImportSecret,
        passphrase: Option<&str>,
        descriptor: &WalletTypeDescriptor,
        index: u32,
    ) -> Result<DerivedKeyMaterial, DerivationError> {
        let wallet_type = descriptor.id;
        if !descriptor.applies_to(secret.kind()) {
            return Err(DerivationError::invalid_secret(
                wallet_type,
                format!("{} cannot be imported as {}", secret.kind(), descriptor.label),
            ));
        }
        if index >= descriptor.scan_bound() {
            return Err(DerivationError::key_derivation(
                format!("{}#{}", wallet_type, index),
                "index beyond the scheme's bound",
            ));
        }
        if secret.kind() == SecretKind::EncryptedKey {
            bip38::check_supported(secret.expose())
                .map_err(|e| self.bip38_error(wallet_type, e))?;
        }
        if secret.requires_passphrase_for(descriptor) && passphrase.is_none() {
            return Err(DerivationError::PassphraseRequired { wallet_type });
        }

        match descriptor.scheme {
            DerivationScheme::AccountBranch { .. } | DerivationScheme::FixedBranch { .. } => {
                let seed_passphrase = if descriptor.accepts_seed_passphrase {
                    passphrase.unwrap_or("")
                } else {
                    ""
                };
                self.derive_from_mnemonic(secret, seed_passphrase, descriptor, index)
            }
            DerivationScheme::SingleKey => self.derive_single_key(secret, passphrase, descriptor),
            DerivationScheme::ExtendedPublicKey => self.derive_watch_only_xpub(secret, descriptor),
            DerivationScheme::SingleAddress => self.derive_watch_only_address(secret, descriptor),
        }
    }

    fn derive_from_mnemonic(
        &self,
        secret: &ImportSecret,
        seed_passphrase: &str,
        descriptor: &WalletTypeDescriptor,
        index: u32,
    ) -> Result<DerivedKeyMaterial, DerivationError> {
        let wallet_type = descriptor.id;
        let script = descriptor
            .script
            .ok_or_else(|| DerivationError::invalid_secret(wallet_type, "no address encoding"))?;
        let path_text = descriptor
            .path_for(index, self.network)
            .ok_or_else(|| DerivationError::invalid_secret(wallet_type, "no derivation path"))?;
        let path = DerivationPath::from_str(&path_text)
            .map_err(|e| DerivationError::key_derivation(&path_text, e))?;

        let mnemonic = Mnemonic::parse_in_normalized(Language::English, secret.expose())
            .map_err(|e| DerivationError::invalid_secret(wallet_type, e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed_normalized(seed_passphrase));

        let master = Xpriv::new_master(self.network, &seed[..])
            .map_err(|e| DerivationError::key_derivation("m", e))?;
        let account = master
            .derive_priv(&self.secp, &path)
            .map_err(|e| DerivationError::key_derivation(&path_text, e))?;
        let account_xpub = Xpub::from_priv(&self.secp, &account);

        let addresses = self.receive_addresses(&account_xpub, script, wallet_type)?;

        Ok(DerivedKeyMaterial {
            wallet_type,
            index,
            derivation_path: Some(path_text),
            script: Some(script),
            extended_public_key: Some(extended_key::to_slip132_string(
                &account_xpub,
                script,
                self.network,
            )),
            addresses,
            private_key: Some(Zeroizing::new(account.to_string())),
        })
    }

    fn derive_single_key(
        &self,
        secret: &ImportSecret,
        passphrase: Option<&str>,
        descriptor: &WalletTypeDescriptor,
    ) -> Result<DerivedKeyMaterial, DerivationError> {
        let wallet_type = descriptor.id;
        let script = descriptor
            .script
            .ok_or_else(|| DerivationError::invalid_secret(wallet_type, "no address encoding"))?;

        let key = match secret.kind() {
            SecretKind::Wif => {
                let key = PrivateKey::from_wif(secret.expose())
                    .map_err(|e| DerivationError::invalid_secret(wallet_type, e.to_string()))?;
                // WIF only tells mainnet from the test networks
                if (key.network == Network::Bitcoin) != (self.network == Network::Bitcoin) {
                    return Err(DerivationError::invalid_secret(
                        wallet_type,
                        format!("private key is not for {}", self.network),
                    ));
                }
                key
            }
            SecretKind::EncryptedKey => {
                let passphrase =
                    passphrase.ok_or(DerivationError::PassphraseRequired { wallet_type })?;
                bip38::decrypt(&self.secp, secret.expose(), passphrase, self.network)
                    .map_err(|e| self.bip38_error(wallet_type, e))?
            }
            other => {
                return Err(DerivationError::invalid_secret(
                    wallet_type,
                    format!("{} is not a private key", other),
                ))
            }
        };

        if script.requires_compressed_key() && !key.compressed {
            return Err(DerivationError::invalid_secret(
                wallet_type,
                "segwit addresses need a compressed key",
            ));
        }

        let public_key = key.public_key(&self.secp);
        let address = address::encode_address(&self.secp, &public_key, script, self.network)
            .map_err(|reason| DerivationError::AddressEncoding {
                wallet_type,
                reason,
            })?;

        // re-encode so a decrypted BIP38 key is handed on as plain WIF for our network
        let key = PrivateKey {
            network: self.network,
            ..key
        };

        Ok(DerivedKeyMaterial {
            wallet_type,
            index: 0,
            derivation_path: None,
            script: Some(script),
            extended_public_key: None,
            addresses: vec![address.to_string()],
            private_key: Some(Zeroizing::new(key.to_wif())),
        })
    }

    fn derive_watch_only_xpub(
        &self,
        secret: &ImportSecret,
        descriptor: &WalletTypeDescriptor,
    ) -> Result<DerivedKeyMaterial, DerivationError> {
        let wallet_type = descriptor.id;
        let parsed = extended_key::parse_extended_public_key(secret.expose())
            .map_err(|reason| DerivationError::invalid_secret(wallet_type, reason))?;
        if !parsed.matches_network(self.network) {
            return Err(DerivationError::invalid_secret(
                wallet_type,
                format!("extended key is not for {}", self.network),
            ));
        }

        let addresses = self.receive_addresses(&parsed.xpub, parsed.script, wallet_type)?;

        Ok(DerivedKeyMaterial {
            wallet_type,
            index: 0,
            derivation_path: None,
            script: Some(parsed.script),
            extended_public_key: Some(secret.expose().to_string()),
            addresses,
            private_key: None,
        })
    }

    fn derive_watch_only_address(
        &self,
        secret: &ImportSecret,
        descriptor: &WalletTypeDescriptor,
    ) -> Result<DerivedKeyMaterial, DerivationError> {
        let wallet_type = descriptor.id;
        let address = secret
            .expose()
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|e| DerivationError::invalid_secret(wallet_type, e.to_string()))?
            .require_network(self.network)
            .map_err(|e| DerivationError::invalid_secret(wallet_type, e.to_string()))?;

        Ok(DerivedKeyMaterial {
            wallet_type,
            index: 0,
            derivation_path: None,
            script: address::script_of(&address),
            extended_public_key: None,
            addresses: vec![address.to_string()],
            private_key: None,
        })
    }

    /// External-chain addresses `0/0 .. 0/(address_count-1)` below `account`
    fn receive_addresses(
        &self,
        account: &Xpub,
        script: ScriptKind,
        wallet_type: WalletTypeId,
    ) -> Result<Vec<String>, DerivationError> {
        let external = ChildNumber::from_normal_idx(0)
            .map_err(|e| DerivationError::key_derivation("0", e))?;

        (0..self.address_count)
            .map(|i| {
                let child_number = ChildNumber::from_normal_idx(i)
                    .map_err(|e| DerivationError::key_derivation(format!("0/{}", i), e))?;
                let child = account
                    .derive_pub(&self.secp, &[external, child_number])
                    .map_err(|e| DerivationError::key_derivation(format!("0/{}", i), e))?;
                let address = address::encode_address(
                    &self.secp,
                    &PublicKey::new(child.public_key),
                    script,
                    self.network,
                )
                .map_err(|reason| DerivationError::AddressEncoding {
                    wallet_type,
                    reason,
                })?;
                Ok(address.to_string())
            })
            .collect()
    }

    fn bip38_error(&self, wallet_type: WalletTypeId, err: Bip38Error) -> DerivationError {
        match err {
            Bip38Error::Unsupported(reason) => DerivationError::invalid_secret(wallet_type, reason),
            Bip38Error::WrongPassphrase => DerivationError::WrongPassphrase,
        }
    }
}
