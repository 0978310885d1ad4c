//! End-to-end discovery scenarios against the in-memory oracle

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bitcoin::Network;
use wallet_discovery::catalogue::{descriptor, UnusedPolicy, WalletTypeId};
use wallet_discovery::derivation::DerivationEngine;
use wallet_discovery::discovery::{
    DiscoveredWallet, DiscoveryBuilder, DiscoveryEvent, DiscoveryObserver, DiscoveryProgress,
    PromptRejected, SchemeStatus, TaskState,
};
use wallet_discovery::scanning::{MockActivityOracle, MockOracleFailureModes};
use wallet_discovery::secret::ImportSecret;
use wallet_discovery::DiscoveryError;
use zeroize::Zeroizing;

const MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const BIP84_FIRST: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

const UNCOMPRESSED_WIF: &str = "5KN7MzqK5wt2TP1fQCYyHBtDrXdJuXbUzm4A9rKAteGu3Qi5CVR";
const UNCOMPRESSED_ADDRESS: &str = "1Jq6MksXQVWzrznvZzxkV6oY57oWXD9TXB";
const BIP38_KEY: &str = "6PRVWUbkzzsbcVac2qwfssoUJAN1Xhrg6bNk8J7Nzm5H7kxEbn2Nh2ZoGg";
const BIP38_PASSWORD: &str = "TestingOneTwoThree";

/// First receive address of a BIP84 account of the test mnemonic
fn bip84_account_address(account: u32) -> String {
    let secret = ImportSecret::parse(MNEMONIC, Network::Bitcoin, false);
    DerivationEngine::new(Network::Bitcoin, 1)
        .derive(&secret, None, descriptor(WalletTypeId::HdSegwitBech32), account)
        .unwrap()
        .first_address()
        .unwrap()
        .to_string()
}

/// Observer answering every prompt with a fixed passphrase
struct ScriptedObserver {
    answer: Option<&'static str>,
    prompts: AtomicUsize,
    titles: Mutex<Vec<String>>,
    found: Mutex<Vec<String>>,
    progress: AtomicUsize,
}

impl ScriptedObserver {
    fn answering(answer: Option<&'static str>) -> Self {
        Self {
            answer,
            prompts: AtomicUsize::new(0),
            titles: Mutex::new(Vec::new()),
            found: Mutex::new(Vec::new()),
            progress: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DiscoveryObserver for ScriptedObserver {
    fn on_progress(&self, _progress: &DiscoveryProgress) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }

    fn on_wallet_found(&self, wallet: &DiscoveredWallet) {
        self.found.lock().unwrap().push(wallet.id.clone());
    }

    async fn on_passphrase_needed(
        &self,
        title: &str,
        _subtitle: &str,
    ) -> Result<Zeroizing<String>, PromptRejected> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.titles.lock().unwrap().push(title.to_string());
        self.answer
            .map(|answer| Zeroizing::new(answer.to_string()))
            .ok_or(PromptRejected)
    }
}

#[tokio::test]
async fn test_every_hd_scheme_offers_its_first_account() {
    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .with_all_account_types(true)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    assert!(!outcome.cancelled);
    let types: HashSet<_> = outcome.wallets.iter().map(|w| w.wallet_type).collect();
    let expected: HashSet<_> = [
        WalletTypeId::HdSegwitBech32,
        WalletTypeId::HdSegwitP2sh,
        WalletTypeId::HdLegacyP2pkh,
        WalletTypeId::HdTaproot,
        WalletTypeId::HdLegacyBreadwallet,
    ]
    .into_iter()
    .collect();
    assert_eq!(types, expected);
    assert!(outcome.wallets.iter().all(|w| w.account == 0 && !w.is_active()));
    assert!(outcome.wallets.iter().all(|w| w.private_key().is_some()));
    assert!(outcome.auto_select().is_none());

    let bip84 = outcome
        .wallets
        .iter()
        .find(|w| w.wallet_type == WalletTypeId::HdSegwitBech32)
        .unwrap();
    assert_eq!(bip84.first_address, BIP84_FIRST);
    assert_eq!(bip84.derivation_path.as_deref(), Some("m/84'/0'/0'"));
}

#[tokio::test]
async fn test_gap_limit_bridges_single_unused_account() {
    let oracle = MockActivityOracle::with_active([
        bip84_account_address(0),
        bip84_account_address(2),
    ]);

    let outcome = DiscoveryBuilder::for_testing(oracle.clone())
        .with_gap_limit(2)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    let accounts: Vec<u32> = outcome.wallets.iter().map(|w| w.account).collect();
    assert_eq!(accounts, vec![0, 2]);
    assert!(outcome.wallets.iter().all(|w| w.is_active()));

    // 0 active, 1 miss, 2 active, 3 and 4 miss
    let report = outcome.report(WalletTypeId::HdSegwitBech32).unwrap();
    assert_eq!(report.examined, 5);
    assert_eq!(report.active, 2);
    assert_eq!(oracle.call_count(), 5);
}

#[tokio::test]
async fn test_gap_limit_stops_before_distant_account() {
    let oracle = MockActivityOracle::with_active([bip84_account_address(3)]);

    let outcome = DiscoveryBuilder::for_testing(oracle.clone())
        .with_gap_limit(2)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    // accounts 0 and 1 are unused, account 3 is never looked at
    assert_eq!(oracle.call_count(), 2);
    assert_eq!(outcome.wallets.len(), 1);
    assert_eq!(outcome.wallets[0].account, 0);
    assert!(!outcome.wallets[0].is_active());
}

#[tokio::test]
async fn test_single_funded_account_is_auto_selected() {
    let oracle = MockActivityOracle::with_active([BIP84_FIRST]);

    let outcome = DiscoveryBuilder::for_testing(oracle)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    let selected = outcome.auto_select().expect("one wallet");
    assert_eq!(selected.wallet_type, WalletTypeId::HdSegwitBech32);
    assert_eq!(selected.first_address, BIP84_FIRST);
    assert!(selected.is_active());
}

#[tokio::test]
async fn test_cancel_while_oracle_is_held() {
    let oracle = MockActivityOracle::new();
    oracle.hold_responses();

    let handle = DiscoveryBuilder::for_testing(oracle.clone())
        .with_all_account_types(true)
        .start(MNEMONIC)
        .unwrap();

    oracle.wait_for_calls(1).await;
    handle.cancel();
    handle.cancel();

    let canceller = handle.canceller();
    let outcome = handle.await_result().await.unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.wallets.is_empty());
    assert!(canceller.is_cancelled());

    // nothing else was asked once the task stopped
    assert_eq!(oracle.call_count(), 1);
    oracle.release_responses();
}

#[tokio::test]
async fn test_cancelled_state_is_reported() {
    let oracle = MockActivityOracle::new();
    oracle.hold_responses();

    let mut handle = DiscoveryBuilder::for_testing(oracle.clone())
        .start(MNEMONIC)
        .unwrap();
    oracle.wait_for_calls(1).await;
    assert_eq!(handle.state(), TaskState::Running);

    handle.cancel();
    while handle.next_event().await.is_some() {}
    assert_eq!(handle.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_rejected_seed_passphrase_leaves_breadwallet() {
    let observer = ScriptedObserver::answering(None);

    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .with_all_account_types(true)
        .with_passphrase_prompt(true)
        .start(MNEMONIC)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();

    // one prompt for the whole task, however many schemes wanted it
    assert_eq!(observer.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(observer.titles.lock().unwrap().as_slice(), ["Passphrase"]);

    assert_eq!(outcome.wallets.len(), 1);
    assert_eq!(outcome.wallets[0].wallet_type, WalletTypeId::HdLegacyBreadwallet);
    assert_eq!(
        outcome.report(WalletTypeId::HdSegwitBech32).unwrap().status,
        SchemeStatus::PassphraseRejected
    );
    assert_eq!(
        outcome.report(WalletTypeId::HdLegacyBreadwallet).unwrap().status,
        SchemeStatus::Completed
    );
}

#[tokio::test]
async fn test_seed_passphrase_changes_wallet() {
    let observer = ScriptedObserver::answering(Some("TREZOR"));

    let prompted = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .with_passphrase_prompt(true)
        .start(MNEMONIC)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();
    assert_eq!(observer.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(prompted.wallets.len(), 1);
    assert_ne!(prompted.wallets[0].first_address, BIP84_FIRST);

    // supplying the same passphrase up front gives the same wallet without a prompt
    let observer = ScriptedObserver::answering(None);
    let supplied = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .with_passphrase("TREZOR")
        .start(MNEMONIC)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();
    assert_eq!(observer.prompts.load(Ordering::SeqCst), 0);
    assert_eq!(supplied.wallets[0].id, prompted.wallets[0].id);
}

#[tokio::test]
async fn test_never_policy_completes_empty() {
    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .with_unused_policy(UnusedPolicy::Never)
        .with_all_account_types(true)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    assert!(!outcome.cancelled);
    assert!(outcome.wallets.is_empty());
    assert!(!outcome.is_degraded());
    assert!(outcome
        .reports
        .iter()
        .all(|report| report.status == SchemeStatus::Completed));
}

#[tokio::test]
async fn test_fallback_policy_only_without_activity() {
    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .with_unused_policy(UnusedPolicy::Fallback)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();
    assert_eq!(outcome.wallets.len(), 1);
    assert_eq!(outcome.wallets[0].first_address, BIP84_FIRST);

    let oracle = MockActivityOracle::with_active([bip84_account_address(1)]);
    let outcome = DiscoveryBuilder::for_testing(oracle)
        .with_unused_policy(UnusedPolicy::Fallback)
        .with_gap_limit(2)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();
    let accounts: Vec<u32> = outcome.wallets.iter().map(|w| w.account).collect();
    assert_eq!(accounts, vec![1]);
}

#[tokio::test]
async fn test_failing_oracle_degrades_without_failing() {
    let oracle = MockActivityOracle::new();
    oracle.set_failure_mode(MockOracleFailureModes {
        fail_all: true,
        ..Default::default()
    });

    let outcome = DiscoveryBuilder::for_testing(oracle)
        .start(MNEMONIC)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    assert!(!outcome.cancelled);
    assert!(outcome.wallets.is_empty());
    assert!(outcome.is_degraded());
    let report = outcome.report(WalletTypeId::HdSegwitBech32).unwrap();
    assert_eq!(report.status, SchemeStatus::Completed);
    assert_eq!(report.unknown, 1);
}

#[tokio::test]
async fn test_uncompressed_wif_is_legacy_only() {
    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .start(UNCOMPRESSED_WIF)
        .unwrap()
        .await_result()
        .await
        .unwrap();

    assert_eq!(outcome.wallets.len(), 1);
    assert_eq!(outcome.wallets[0].wallet_type, WalletTypeId::LegacyP2pkh);
    assert_eq!(outcome.wallets[0].first_address, UNCOMPRESSED_ADDRESS);
    assert_eq!(outcome.wallets[0].private_key(), Some(UNCOMPRESSED_WIF));
    for segwit in [WalletTypeId::SegwitBech32, WalletTypeId::SegwitP2sh] {
        assert_eq!(
            outcome.report(segwit).unwrap().status,
            SchemeStatus::InvalidSecretFormat
        );
    }
}

#[tokio::test]
async fn test_bip38_key_prompts_once_for_password() {
    let observer = ScriptedObserver::answering(Some(BIP38_PASSWORD));

    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .start(BIP38_KEY)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();

    assert_eq!(observer.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(observer.titles.lock().unwrap().as_slice(), ["Password"]);
    assert_eq!(outcome.wallets.len(), 1);
    assert_eq!(outcome.wallets[0].first_address, UNCOMPRESSED_ADDRESS);
    assert_eq!(outcome.wallets[0].private_key(), Some(UNCOMPRESSED_WIF));
    assert_eq!(observer.found.lock().unwrap().as_slice(), [outcome.wallets[0].id.clone()]);
}

#[tokio::test]
async fn test_bip38_wrong_password_finds_nothing() {
    let observer = ScriptedObserver::answering(Some("not the password"));

    let outcome = DiscoveryBuilder::for_testing(MockActivityOracle::new())
        .start(BIP38_KEY)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();

    assert_eq!(observer.prompts.load(Ordering::SeqCst), 1);
    assert!(!outcome.cancelled);
    assert!(outcome.wallets.is_empty());
    assert!(outcome
        .reports
        .iter()
        .all(|report| report.status == SchemeStatus::PassphraseRejected));
}

#[tokio::test]
async fn test_invalid_text_fails_the_task() {
    for text in ["", "   ", "hello world", "abandon abandon abandon"] {
        let handle = DiscoveryBuilder::for_testing(MockActivityOracle::new())
            .start(text)
            .unwrap();
        assert_eq!(handle.state(), TaskState::Failed);
        let err = handle.await_result().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidSecretFormat { .. }), "{}", text);
    }
}

#[tokio::test]
async fn test_wallet_events_precede_the_result() {
    let oracle = MockActivityOracle::with_active([BIP84_FIRST]);
    let mut handle = DiscoveryBuilder::for_testing(oracle)
        .with_all_account_types(true)
        .start(MNEMONIC)
        .unwrap();

    let mut found = Vec::new();
    let mut progress = 0;
    while let Some(event) = handle.next_event().await {
        match event {
            DiscoveryEvent::WalletFound(wallet) => found.push(wallet.id.clone()),
            DiscoveryEvent::Progress(_) => progress += 1,
            DiscoveryEvent::PassphraseNeeded(request) => request.reject(),
        }
    }

    let outcome = handle.await_result().await.unwrap();
    let ids: Vec<String> = outcome.wallets.iter().map(|w| w.id.clone()).collect();
    assert_eq!(found, ids);
    assert!(progress > ids.len());
}

#[tokio::test]
async fn test_testnet_watch_only_address() {
    let outcome = DiscoveryBuilder::testnet()
        .with_oracle(Arc::new(MockActivityOracle::new()))
        .start("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx")
        .unwrap()
        .await_result()
        .await
        .unwrap();
    assert_eq!(outcome.wallets.len(), 1);
    assert!(outcome.wallets[0].is_watch_only());

    // a mainnet address is not a testnet import
    let err = DiscoveryBuilder::testnet()
        .with_oracle(Arc::new(MockActivityOracle::new()))
        .start(BIP84_FIRST)
        .unwrap()
        .await_result()
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidSecretFormat { .. }));
}

/// Builder with the default concurrent scheme scanning
fn concurrent_builder(oracle: MockActivityOracle) -> DiscoveryBuilder {
    DiscoveryBuilder::new()
        .with_oracle(Arc::new(oracle))
        .with_all_account_types(true)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_schemes_share_one_prompt() {
    let observer = ScriptedObserver::answering(Some("TREZOR"));

    let outcome = concurrent_builder(MockActivityOracle::new())
        .with_passphrase_prompt(true)
        .start(MNEMONIC)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();

    // BIP84, BIP49, BIP44 and BIP86 all wait on the same challenge
    assert_eq!(observer.prompts.load(Ordering::SeqCst), 1);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.wallets.len(), 5);
    assert!(outcome
        .reports
        .iter()
        .all(|report| report.status == SchemeStatus::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejection_keeps_breadwallet() {
    let observer = ScriptedObserver::answering(None);

    let outcome = concurrent_builder(MockActivityOracle::new())
        .with_passphrase_prompt(true)
        .start(MNEMONIC)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();

    assert_eq!(observer.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.wallets.len(), 1);
    assert_eq!(outcome.wallets[0].wallet_type, WalletTypeId::HdLegacyBreadwallet);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancel_stops_every_scheme() {
    let oracle = MockActivityOracle::new();
    oracle.hold_responses();

    let handle = concurrent_builder(oracle.clone()).start(MNEMONIC).unwrap();

    // one held lookup per mnemonic wallet type
    oracle.wait_for_calls(5).await;
    handle.cancel();

    let outcome = handle.await_result().await.unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.wallets.is_empty());
    assert!(outcome
        .reports
        .iter()
        .all(|report| report.status == SchemeStatus::Cancelled));

    oracle.release_responses();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(oracle.call_count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_found_order_matches_outcome() {
    let oracle = MockActivityOracle::with_active((0..4).map(bip84_account_address));
    let observer = ScriptedObserver::answering(None);

    let outcome = concurrent_builder(oracle)
        .start(MNEMONIC)
        .unwrap()
        .run_with(&observer)
        .await
        .unwrap();

    let ids: Vec<String> = outcome.wallets.iter().map(|w| w.id.clone()).collect();
    assert_eq!(*observer.found.lock().unwrap(), ids);

    // four active BIP84 accounts plus the first account of every other type
    assert_eq!(outcome.wallets.len(), 8);
    let bip84: Vec<u32> = outcome
        .wallets
        .iter()
        .filter(|w| w.wallet_type == WalletTypeId::HdSegwitBech32)
        .map(|w| w.account)
        .collect();
    assert_eq!(bip84, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_dropped_handle_stops_lookups() {
    let oracle = MockActivityOracle::with_active((0..20).map(bip84_account_address));
    oracle.hold_responses();

    let handle = DiscoveryBuilder::new()
        .with_oracle(Arc::new(oracle.clone()))
        .start(MNEMONIC)
        .unwrap();
    oracle.wait_for_calls(1).await;
    drop(handle);

    oracle.release_responses();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(oracle.call_count(), 1);
}
