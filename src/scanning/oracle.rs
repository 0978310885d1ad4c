//! Address activity oracle contract
//!
//! The discovery engine never talks to a blockchain directly. It asks an
//! [`ActivityOracle`] whether an address (or, where supported, an extended
//! public key) has ever appeared in a transaction. Implementations must be
//! safe to call concurrently and must map every failure to an
//! [`OracleError`] rather than guessing an answer.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::OracleError;

/// What an oracle is asked about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityTarget {
    /// A single encoded address
    Address(String),
    /// An account-level extended public key (SLIP-132 encoded)
    ExtendedPublicKey(String),
}

impl ActivityTarget {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityTarget::Address(address) => address,
            ActivityTarget::ExtendedPublicKey(key) => key,
        }
    }

    /// Short name used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityTarget::Address(_) => "address",
            ActivityTarget::ExtendedPublicKey(_) => "extended public key",
        }
    }
}

impl fmt::Display for ActivityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.as_str())
    }
}

/// Answer of a successful oracle lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// At least one transaction (confirmed or pending) touches the target
    Active,
    /// The target has never been used
    Inactive,
}

impl Activity {
    pub fn is_active(&self) -> bool {
        matches!(self, Activity::Active)
    }
}

/// Answers "has this ever been used on-chain?"
#[async_trait]
pub trait ActivityOracle: Send + Sync {
    /// Look up the transaction history of `target`
    async fn has_history(&self, target: &ActivityTarget) -> Result<Activity, OracleError>;

    /// Whether [`ActivityTarget::ExtendedPublicKey`] lookups are answered
    ///
    /// When false the scanner only asks about derived addresses.
    fn supports_extended_keys(&self) -> bool {
        false
    }
}
