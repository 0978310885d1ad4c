//! Account discovery for Bitcoin wallet imports
//!
//! Given the text a user pastes into an "import wallet" screen (a BIP39
//! mnemonic, a WIF or BIP38 private key, an extended public key or a plain
//! address) this crate works out which wallets it actually controls. It
//! derives candidates across the supported wallet types, asks an
//! [`ActivityOracle`](scanning::ActivityOracle) which ones have on-chain
//! history, and streams the wallets worth offering back to the caller,
//! cancellably and with interactive passphrase prompts.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wallet_discovery::discovery::{start_discovery, DiscoveryConfig, DiscoveryOptions};
//! use wallet_discovery::scanning::MockActivityOracle;
//!
//! # async fn example() -> Result<(), wallet_discovery::DiscoveryError> {
//! let handle = start_discovery(
//!     "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
//!     DiscoveryOptions::default(),
//!     DiscoveryConfig::default(),
//!     Arc::new(MockActivityOracle::new()),
//! );
//! let outcome = handle.await_result().await?;
//! if let Some(wallet) = outcome.auto_select() {
//!     println!("importing {}", wallet);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `http` (default): Esplora-backed [`EsploraOracle`](scanning::EsploraOracle)
//! - `cli`: the `discover` binary (implies `http`)
//!
//! Without `http` callers supply their own oracle implementation.

pub mod catalogue;
pub mod derivation;
pub mod discovery;
pub mod errors;
pub mod scanning;
pub mod secret;

pub use catalogue::{
    catalogue, descriptor, descriptors_for, DerivationScheme, ScriptKind, UnusedPolicy,
    WalletTypeDescriptor, WalletTypeId,
};
pub use derivation::{DerivationEngine, DerivedKeyMaterial};
pub use discovery::{
    start_discovery, DiscoveredWallet, DiscoveryBuilder, DiscoveryConfig, DiscoveryEvent,
    DiscoveryHandle, DiscoveryObserver, DiscoveryOptions, DiscoveryOutcome, DiscoveryProgress,
    PromptRejected, TaskState,
};
pub use errors::*;
pub use scanning::{
    Activity, ActivityOracle, ActivityTarget, Classification, PassphraseRequest, SchemeReport,
    SchemeStatus,
};
pub use secret::{ImportSecret, SecretKind};
