//! Discovery configuration
//!
//! [`DiscoveryConfig`] holds the knobs that apply to every task run by an
//! application (network, gap limits, probing). [`DiscoveryOptions`] carries
//! what the caller chooses per import.

use std::fmt;
use std::fs;
use std::path::Path;

use bitcoin::Network;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::catalogue::{DerivationScheme, UnusedPolicy, WalletTypeDescriptor};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::scanning::ScanSettings;

/// Application-wide discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Network addresses and keys are derived for
    pub network: Network,
    /// Overrides every HD wallet type's gap limit
    pub gap_limit: Option<u32>,
    /// Overrides the number of BIP44-style accounts scanned at most
    pub max_accounts: Option<u32>,
    /// Receive addresses asked about per candidate
    pub address_probe_depth: u32,
    /// Ask the oracle about account xpubs when it supports them
    pub probe_extended_keys: bool,
    /// Scan wallet types concurrently instead of one after another
    pub concurrent_schemes: bool,
    /// Overrides every wallet type's policy for unused first candidates
    pub unused_policy: Option<UnusedPolicy>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            gap_limit: None,
            max_accounts: None,
            address_probe_depth: 1,
            probe_extended_keys: true,
            concurrent_schemes: true,
            unused_policy: None,
        }
    }
}

impl DiscoveryConfig {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> DiscoveryResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            DiscoveryError::invalid_configuration(
                "config",
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> DiscoveryResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DiscoveryError::invalid_configuration("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.gap_limit == Some(0) {
            return Err(DiscoveryError::invalid_configuration(
                "gap_limit",
                "must be at least 1",
            ));
        }
        if self.max_accounts == Some(0) {
            return Err(DiscoveryError::invalid_configuration(
                "max_accounts",
                "must be at least 1",
            ));
        }
        if self.address_probe_depth == 0 {
            return Err(DiscoveryError::invalid_configuration(
                "address_probe_depth",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Apply the overrides to a catalogue entry
    pub fn apply(&self, descriptor: &WalletTypeDescriptor) -> WalletTypeDescriptor {
        let mut descriptor = *descriptor;
        if descriptor.scheme.is_hd() {
            if let Some(gap_limit) = self.gap_limit {
                descriptor.gap_limit = gap_limit;
            }
        }
        if let DerivationScheme::AccountBranch { .. } = descriptor.scheme {
            if let Some(max_accounts) = self.max_accounts {
                descriptor.max_index = max_accounts;
            }
        }
        if let Some(policy) = self.unused_policy {
            descriptor.unused_policy = policy;
        }
        descriptor
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            address_probe_depth: self.address_probe_depth,
            probe_extended_keys: self.probe_extended_keys,
        }
    }
}

/// Per-import choices of the caller
#[derive(Clone, Default)]
pub struct DiscoveryOptions {
    /// Treat a mnemonic as protected by a BIP39 passphrase and ask for it
    pub require_passphrase_prompt: bool,
    /// Try every applicable wallet type, not only the primary ones
    pub search_all_account_types: bool,
    /// Passphrase known up front; used instead of prompting
    pub passphrase: Option<Zeroizing<String>>,
}

impl DiscoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passphrase_prompt(mut self, required: bool) -> Self {
        self.require_passphrase_prompt = required;
        self
    }

    pub fn with_all_account_types(mut self, search_all: bool) -> Self {
        self.search_all_account_types = search_all;
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }
}

impl fmt::Debug for DiscoveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryOptions")
            .field("require_passphrase_prompt", &self.require_passphrase_prompt)
            .field("search_all_account_types", &self.search_all_account_types)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
