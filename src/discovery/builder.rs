//! Builder for discovery tasks
//!
//! Provides a fluent API over [`DiscoveryConfig`], [`DiscoveryOptions`] and
//! the oracle choice, validated when the task is started.

#[cfg(feature = "http")]
use std::time::Duration;
use std::sync::Arc;

use bitcoin::Network;

use crate::catalogue::UnusedPolicy;
use crate::discovery::config::{DiscoveryConfig, DiscoveryOptions};
use crate::discovery::task::{start_discovery, DiscoveryHandle};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::scanning::{ActivityOracle, MockActivityOracle};

#[cfg(feature = "http")]
use crate::scanning::EsploraOracle;

/// Where activity answers come from
#[derive(Clone)]
enum OracleChoice {
    Custom(Arc<dyn ActivityOracle>),
    #[cfg(feature = "http")]
    Esplora { url: String, timeout: Option<Duration> },
}

/// Builder for starting discovery tasks with fluent configuration API
#[derive(Clone)]
pub struct DiscoveryBuilder {
    config: DiscoveryConfig,
    options: DiscoveryOptions,
    oracle: Option<OracleChoice>,
}

impl DiscoveryBuilder {
    /// Create a builder with default configuration and no oracle
    pub fn new() -> Self {
        Self {
            config: DiscoveryConfig::default(),
            options: DiscoveryOptions::default(),
            oracle: None,
        }
    }

    /// Replace the whole configuration, e.g. one loaded from a file
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.config.network = network;
        self
    }

    /// Override the gap limit of every HD wallet type
    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.config.gap_limit = Some(gap_limit);
        self
    }

    /// Override how many accounts are scanned at most
    pub fn with_max_accounts(mut self, max_accounts: u32) -> Self {
        self.config.max_accounts = Some(max_accounts);
        self
    }

    pub fn with_address_probe_depth(mut self, depth: u32) -> Self {
        self.config.address_probe_depth = depth;
        self
    }

    pub fn with_probe_extended_keys(mut self, probe: bool) -> Self {
        self.config.probe_extended_keys = probe;
        self
    }

    pub fn with_concurrent_schemes(mut self, concurrent: bool) -> Self {
        self.config.concurrent_schemes = concurrent;
        self
    }

    /// Override every wallet type's policy for unused first candidates
    pub fn with_unused_policy(mut self, policy: UnusedPolicy) -> Self {
        self.config.unused_policy = Some(policy);
        self
    }

    /// Ask for a BIP39 passphrase when importing a mnemonic
    pub fn with_passphrase_prompt(mut self, required: bool) -> Self {
        self.options.require_passphrase_prompt = required;
        self
    }

    /// Try every applicable wallet type instead of the primary ones only
    pub fn with_all_account_types(mut self, search_all: bool) -> Self {
        self.options.search_all_account_types = search_all;
        self
    }

    /// Supply the passphrase up front instead of prompting
    pub fn with_passphrase<S: Into<String>>(mut self, passphrase: S) -> Self {
        self.options = self.options.with_passphrase(passphrase);
        self
    }

    /// Use a custom oracle
    pub fn with_oracle(mut self, oracle: Arc<dyn ActivityOracle>) -> Self {
        self.oracle = Some(OracleChoice::Custom(oracle));
        self
    }

    /// Use an Esplora server
    #[cfg(feature = "http")]
    pub fn with_esplora_url<S: Into<String>>(mut self, url: S) -> Self {
        self.oracle = Some(OracleChoice::Esplora {
            url: url.into(),
            timeout: None,
        });
        self
    }

    /// Set the Esplora request timeout; ignored for other oracles
    #[cfg(feature = "http")]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Some(OracleChoice::Esplora { timeout: current, .. }) = &mut self.oracle {
            *current = Some(timeout);
        }
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Validate the configuration
    pub fn validate(&self) -> DiscoveryResult<()> {
        self.config.validate()?;
        if self.oracle.is_none() {
            return Err(DiscoveryError::invalid_configuration(
                "oracle",
                "no activity oracle configured",
            ));
        }
        Ok(())
    }

    fn build_oracle(&self) -> DiscoveryResult<Arc<dyn ActivityOracle>> {
        match &self.oracle {
            Some(OracleChoice::Custom(oracle)) => Ok(oracle.clone()),
            #[cfg(feature = "http")]
            Some(OracleChoice::Esplora { url, timeout }) => {
                let oracle = match timeout {
                    Some(timeout) => EsploraOracle::with_timeout(url.clone(), *timeout)?,
                    None => EsploraOracle::new(url.clone())?,
                };
                Ok(Arc::new(oracle))
            }
            None => Err(DiscoveryError::invalid_configuration(
                "oracle",
                "no activity oracle configured",
            )),
        }
    }

    /// Validate and start a task for `text`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, text: &str) -> DiscoveryResult<DiscoveryHandle> {
        self.validate()?;
        let oracle = self.build_oracle()?;
        Ok(start_discovery(
            text,
            self.options.clone(),
            self.config.clone(),
            oracle,
        ))
    }
}

impl Default for DiscoveryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience methods for common configurations
impl DiscoveryBuilder {
    /// Builder backed by an in-memory oracle, scanning schemes one at a time
    pub fn for_testing(oracle: MockActivityOracle) -> Self {
        Self::new()
            .with_oracle(Arc::new(oracle))
            .with_concurrent_schemes(false)
    }

    /// Builder for testnet imports
    pub fn testnet() -> Self {
        Self::new().with_network(Network::Testnet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = DiscoveryBuilder::new()
            .with_network(Network::Testnet)
            .with_gap_limit(3)
            .with_address_probe_depth(2)
            .with_all_account_types(true)
            .with_passphrase_prompt(true);

        assert_eq!(builder.config().network, Network::Testnet);
        assert_eq!(builder.config().gap_limit, Some(3));
        assert_eq!(builder.config().address_probe_depth, 2);
        assert!(builder.options().search_all_account_types);
        assert!(builder.options().require_passphrase_prompt);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        // No oracle
        let result = DiscoveryBuilder::new().start("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert!(matches!(result, Err(DiscoveryError::InvalidConfiguration { .. })));

        // Zero gap limit
        let result = DiscoveryBuilder::for_testing(MockActivityOracle::new())
            .with_gap_limit(0)
            .start("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert!(result.is_err());

        // Zero probe depth
        let result = DiscoveryBuilder::for_testing(MockActivityOracle::new())
            .with_address_probe_depth(0)
            .start("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_oracle_start() {
        let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
            .start("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH")
            .unwrap()
            .await_result()
            .await
            .unwrap();
        assert_eq!(outcome.wallets.len(), 1);
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_esplora_timeout_applies() {
        let builder = DiscoveryBuilder::new()
            .with_esplora_url("https://blockstream.info/api")
            .with_timeout(Duration::from_secs(3));
        assert!(builder.validate().is_ok());
        assert!(matches!(
            builder.oracle,
            Some(OracleChoice::Esplora { timeout: Some(_), .. })
        ));
    }
}
