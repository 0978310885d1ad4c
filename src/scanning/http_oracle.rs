//! Esplora-backed activity oracle
//!
//! Uses the public Esplora REST API (`GET {base}/address/{address}`) and
//! treats an address as active when its confirmed or mempool transaction
//! count is non-zero.
//!
//! ```rust,no_run
//! use wallet_discovery::scanning::{ActivityOracle, ActivityTarget, EsploraOracle};
//!
//! async fn check() -> Result<(), Box<dyn std::error::Error>> {
//!     let oracle = EsploraOracle::new("https://blockstream.info/api")?;
//!     let activity = oracle
//!         .has_history(&ActivityTarget::Address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".into()))
//!         .await?;
//!     println!("{:?}", activity);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{DiscoveryError, DiscoveryResult, OracleError};
use crate::scanning::oracle::{Activity, ActivityOracle, ActivityTarget};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct EsploraStats {
    tx_count: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraAddressResponse {
    chain_stats: EsploraStats,
    mempool_stats: EsploraStats,
}

impl EsploraAddressResponse {
    fn activity(&self) -> Activity {
        if self.chain_stats.tx_count + self.mempool_stats.tx_count > 0 {
            Activity::Active
        } else {
            Activity::Inactive
        }
    }
}

/// Oracle backed by an Esplora HTTP server
#[derive(Clone)]
pub struct EsploraOracle {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl EsploraOracle {
    /// Create an oracle with the default 10 second timeout
    pub fn new(base_url: impl Into<String>) -> DiscoveryResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create an oracle with a custom request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> DiscoveryResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(DiscoveryError::invalid_configuration(
                "esplora_url",
                "base URL must not be empty",
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DiscoveryError::invalid_configuration(
                    "esplora_url",
                    format!("failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_request_error(&self, err: reqwest::Error) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(self.timeout)
        } else {
            OracleError::network(format!("HTTP request failed: {}", err))
        }
    }
}

impl std::fmt::Debug for EsploraOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsploraOracle")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ActivityOracle for EsploraOracle {
    async fn has_history(&self, target: &ActivityTarget) -> Result<Activity, OracleError> {
        let address = match target {
            ActivityTarget::Address(address) => address,
            ActivityTarget::ExtendedPublicKey(_) => {
                return Err(OracleError::Unsupported {
                    target_kind: target.kind(),
                })
            }
        };

        let url = format!("{}/address/{}", self.base_url, address);
        debug!("Querying Esplora for {}", address);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            return Err(OracleError::network(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: EsploraAddressResponse = response
            .json()
            .await
            .map_err(|e| OracleError::invalid_response(format!("Failed to parse response: {}", e)))?;

        let activity = body.activity();
        debug!(
            "Esplora: {} has {} confirmed and {} pending transactions",
            address, body.chain_stats.tx_count, body.mempool_stats.tx_count
        );
        Ok(activity)
    }
}
