//! Discovery tasks
//!
//! A task turns one piece of import text into the set of wallets worth
//! offering to the user. Start one with [`start_discovery`] or a
//! [`DiscoveryBuilder`], then either consume [`DiscoveryEvent`]s from the
//! [`DiscoveryHandle`] or hand it a [`DiscoveryObserver`].

pub mod builder;
pub mod config;
pub mod events;
pub mod observer;
pub mod task;

pub use builder::DiscoveryBuilder;
pub use config::{DiscoveryConfig, DiscoveryOptions};
pub use events::{wallet_id, DiscoveredWallet, DiscoveryEvent, DiscoveryProgress};
pub use observer::{DiscoveryObserver, NoopObserver, PromptRejected};
pub use task::{start_discovery, DiscoveryHandle, DiscoveryOutcome, DiscoveryTask, TaskState};

pub use crate::scanning::{SchemeReport, SchemeStatus};
