//! Error types for the account discovery engine
//!
//! Errors are layered the same way the engine is: the derivation engine
//! reports [`DerivationError`], the activity oracle reports [`OracleError`],
//! and only setup failures that prevent every wallet type from running
//! surface as a task-level [`DiscoveryError`].

use std::time::Duration;

use thiserror::Error;

use crate::catalogue::WalletTypeId;

/// Result alias for task-level operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Task-level failures
///
/// Everything scheme-local (network failures, rejected passphrases, secrets a
/// particular derivation cannot use) is absorbed by the scanners and reported
/// through [`crate::discovery::SchemeReport`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The import text cannot be used by any wallet type
    #[error("Invalid secret format: {reason}")]
    InvalidSecretFormat { reason: String },

    /// The configuration handed to the builder is unusable
    #[error("Invalid discovery configuration: {field} - {message}")]
    InvalidConfiguration { field: String, message: String },

    /// The background task died before settling
    #[error("Discovery task aborted: {reason}")]
    TaskAborted { reason: String },
}

impl DiscoveryError {
    pub fn invalid_secret(reason: impl Into<String>) -> Self {
        Self::InvalidSecretFormat {
            reason: reason.into(),
        }
    }

    pub fn invalid_configuration(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Failures of the derivation engine for one (secret, wallet type, index)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// The secret cannot be interpreted by this wallet type
    #[error("Secret cannot be used for {wallet_type}: {reason}")]
    InvalidSecretFormat {
        wallet_type: WalletTypeId,
        reason: String,
    },

    /// The secret is protected and no passphrase was supplied
    #[error("A passphrase is required to derive {wallet_type}")]
    PassphraseRequired { wallet_type: WalletTypeId },

    /// The supplied passphrase does not decrypt the secret
    #[error("Wrong passphrase for encrypted key")]
    WrongPassphrase,

    /// BIP32 derivation failed (invalid child, key out of range)
    #[error("Key derivation failed at {path}: {reason}")]
    KeyDerivation { path: String, reason: String },

    /// The derived public key cannot be encoded for the requested script
    #[error("Address encoding failed for {wallet_type}: {reason}")]
    AddressEncoding {
        wallet_type: WalletTypeId,
        reason: String,
    },
}

impl DerivationError {
    pub fn invalid_secret(wallet_type: WalletTypeId, reason: impl Into<String>) -> Self {
        Self::InvalidSecretFormat {
            wallet_type,
            reason: reason.into(),
        }
    }

    pub fn key_derivation(path: impl ToString, err: impl ToString) -> Self {
        Self::KeyDerivation {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    /// Errors that mean "this wallet type does not apply to the secret"
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSecretFormat { .. } | Self::AddressEncoding { .. }
        )
    }
}

/// Failures reported by an [`crate::scanning::ActivityOracle`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Transport-level failure (connection refused, DNS, TLS, HTTP status)
    #[error("Oracle network error: {message}")]
    Network { message: String },

    /// The backend did not answer in time
    #[error("Oracle request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with something we could not interpret
    #[error("Oracle returned an invalid response: {message}")]
    InvalidResponse { message: String },

    /// The backend cannot answer for this kind of target
    #[error("Oracle does not support {target_kind} lookups")]
    Unsupported { target_kind: &'static str },
}

impl OracleError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}
