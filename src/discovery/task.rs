//! Discovery task
//!
//! One task per import. It parses the secret, picks the wallet types to
//! try, runs one [`CandidateScanner`] per type (concurrently by default) and
//! streams [`DiscoveryEvent`]s to the caller until it settles.
//!
//! ```text
//! Running ──> Completed(wallets)
//!    │──────> Cancelled
//!    └──────> Failed(reason)
//! ```
//!
//! Terminal states never change. Scheme-local problems (network errors,
//! declined passphrases, secrets a wallet type cannot use) are absorbed into
//! [`SchemeReport`]s; the task only fails when no wallet type can use the
//! import text at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalogue::{descriptors_for, WalletTypeDescriptor};
use crate::derivation::DerivationEngine;
use crate::discovery::config::{DiscoveryConfig, DiscoveryOptions};
use crate::discovery::events::{DiscoveredWallet, DiscoveryEvent, DiscoveryProgress};
use crate::discovery::observer::{DiscoveryObserver, PromptRejected};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::scanning::{
    ActivityOracle, CancellationHandle, CancellationToken, Candidate, CandidateScanner,
    DiscoveryCancellation, PassphraseCache, PassphraseRequest, ScanContext, ScanListener,
    ScanOutcome, ScanStage, ScanStep, SchemeReport, SchemeStatus,
};
use crate::secret::ImportSecret;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle of a discovery task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// Shared, settle-once task state
#[derive(Debug, Clone)]
struct StateCell(Arc<Mutex<TaskState>>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(TaskState::Running)))
    }

    fn get(&self) -> TaskState {
        *lock(&self.0)
    }

    /// Move to a terminal state; ignored once settled
    fn settle(&self, next: TaskState) -> bool {
        let mut state = lock(&self.0);
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }
}

/// Final result of a task
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// The task was cancelled; `wallets` holds what was found before that
    pub cancelled: bool,
    /// Discovered wallets in discovery order
    pub wallets: Vec<Arc<DiscoveredWallet>>,
    /// One report per wallet type tried
    pub reports: Vec<SchemeReport>,
}

impl DiscoveryOutcome {
    /// The wallet to save without asking, when exactly one was found
    pub fn auto_select(&self) -> Option<&Arc<DiscoveredWallet>> {
        match self.wallets.as_slice() {
            [only] if !self.cancelled => Some(only),
            _ => None,
        }
    }

    /// Some wallet type could not be fully classified because of oracle failures
    pub fn is_degraded(&self) -> bool {
        self.reports.iter().any(SchemeReport::is_degraded)
    }

    pub fn report(&self, wallet_type: crate::catalogue::WalletTypeId) -> Option<&SchemeReport> {
        self.reports.iter().find(|report| report.wallet_type == wallet_type)
    }
}

/// Listener the scanners report into; owns the ordered wallet list
struct TaskSink {
    events: mpsc::UnboundedSender<DiscoveryEvent>,
    wallets: Mutex<Vec<Arc<DiscoveredWallet>>>,
    examined: AtomicU64,
}

impl TaskSink {
    fn new(events: mpsc::UnboundedSender<DiscoveryEvent>) -> Self {
        Self {
            events,
            wallets: Mutex::new(Vec::new()),
            examined: AtomicU64::new(0),
        }
    }

    fn wallets(&self) -> Vec<Arc<DiscoveredWallet>> {
        lock(&self.wallets).clone()
    }
}

impl ScanListener for TaskSink {
    fn on_step(&self, step: &ScanStep) {
        let examined = match step.stage {
            ScanStage::Classified(_) => self.examined.fetch_add(1, Ordering::SeqCst) + 1,
            _ => self.examined.load(Ordering::SeqCst),
        };
        let _ = self
            .events
            .send(DiscoveryEvent::Progress(DiscoveryProgress::from_step(step, examined)));
    }

    fn on_candidate_accepted(&self, candidate: Candidate) {
        let wallet = Arc::new(DiscoveredWallet::from_candidate(candidate));
        debug!("Discovered {} wallet {}", wallet.wallet_type, wallet.first_address);

        // push and send under one lock so the list and the event stream agree on order
        let mut wallets = lock(&self.wallets);
        wallets.push(wallet.clone());
        let _ = self.events.send(DiscoveryEvent::WalletFound(wallet));
    }

    fn on_passphrase_needed(&self, request: PassphraseRequest) -> bool {
        self.events
            .send(DiscoveryEvent::PassphraseNeeded(request))
            .is_ok()
    }
}

/// Session object of one import
pub struct DiscoveryTask {
    secret: Arc<ImportSecret>,
    descriptors: Vec<WalletTypeDescriptor>,
    config: DiscoveryConfig,
    oracle: Arc<dyn ActivityOracle>,
    passphrases: Arc<PassphraseCache>,
    cancel: DiscoveryCancellation,
    sink: Arc<TaskSink>,
    state: StateCell,
}

impl DiscoveryTask {
    fn new(
        text: &str,
        options: DiscoveryOptions,
        config: DiscoveryConfig,
        oracle: Arc<dyn ActivityOracle>,
        cancel: DiscoveryCancellation,
        sink: Arc<TaskSink>,
        state: StateCell,
    ) -> DiscoveryResult<Self> {
        if text.trim().is_empty() {
            return Err(DiscoveryError::invalid_secret("import text is empty"));
        }

        let protected = options.require_passphrase_prompt || options.passphrase.is_some();
        let secret = ImportSecret::parse(text, config.network, protected);
        if !secret.is_valid() {
            return Err(DiscoveryError::invalid_secret(
                "not a mnemonic, private key, extended public key or address",
            ));
        }

        let descriptors: Vec<_> = descriptors_for(secret.kind(), options.search_all_account_types)
            .iter()
            .map(|descriptor| config.apply(descriptor))
            .collect();
        if descriptors.is_empty() {
            return Err(DiscoveryError::invalid_secret(format!(
                "no wallet type accepts a {}",
                secret.kind()
            )));
        }

        let passphrases = Arc::new(PassphraseCache::new());
        if let Some(passphrase) = options.passphrase {
            passphrases.seed(secret.fingerprint(), passphrase);
        }

        Ok(Self {
            secret: Arc::new(secret),
            descriptors,
            config,
            oracle,
            passphrases,
            cancel,
            sink,
            state,
        })
    }

    async fn run(self) -> DiscoveryResult<DiscoveryOutcome> {
        info!(
            "Starting discovery of a {} across {} wallet types",
            self.secret.kind(),
            self.descriptors.len()
        );

        let ctx = ScanContext {
            secret: self.secret.clone(),
            engine: Arc::new(DerivationEngine::new(
                self.config.network,
                self.config.address_probe_depth,
            )),
            oracle: self.oracle.clone(),
            passphrases: self.passphrases.clone(),
            cancel: self.cancel.clone(),
            listener: self.sink.clone(),
            settings: self.config.scan_settings(),
        };

        let outcomes = if self.config.concurrent_schemes {
            self.run_concurrently(ctx).await
        } else {
            self.run_sequentially(ctx).await
        };
        self.settle(outcomes)
    }

    async fn run_concurrently(&self, ctx: ScanContext) -> Vec<(SchemeReport, Option<Candidate>)> {
        let handles: Vec<(_, JoinHandle<ScanOutcome>)> = self
            .descriptors
            .iter()
            .map(|descriptor| {
                let scanner = CandidateScanner::new(ctx.clone(), *descriptor);
                (descriptor.id, tokio::spawn(scanner.run()))
            })
            .collect();
        drop(ctx);

        let mut outcomes = Vec::with_capacity(handles.len());
        for (wallet_type, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push((outcome.report, outcome.fallback)),
                Err(err) => {
                    warn!("Scanner for {} aborted: {}", wallet_type, err);
                    outcomes.push((SchemeReport::new(wallet_type, SchemeStatus::Aborted), None));
                }
            }
        }
        outcomes
    }

    async fn run_sequentially(&self, ctx: ScanContext) -> Vec<(SchemeReport, Option<Candidate>)> {
        let mut outcomes = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            let outcome = CandidateScanner::new(ctx.clone(), *descriptor).run().await;
            outcomes.push((outcome.report, outcome.fallback));
        }
        outcomes
    }

    fn settle(
        self,
        outcomes: Vec<(SchemeReport, Option<Candidate>)>,
    ) -> DiscoveryResult<DiscoveryOutcome> {
        let cancelled = self.cancel.is_cancelled()
            || outcomes
                .iter()
                .any(|(report, _)| report.status == SchemeStatus::Cancelled);

        let all_unusable = outcomes
            .iter()
            .all(|(report, _)| report.status == SchemeStatus::InvalidSecretFormat);
        if all_unusable && !cancelled {
            self.state.settle(TaskState::Failed);
            warn!("No wallet type can use this {}", self.secret.kind());
            return Err(DiscoveryError::invalid_secret(format!(
                "no wallet type can use this {}",
                self.secret.kind()
            )));
        }

        let any_active = outcomes.iter().any(|(report, _)| report.active > 0);
        let mut reports = Vec::with_capacity(outcomes.len());
        for (report, fallback) in outcomes {
            if let Some(candidate) = fallback {
                if !cancelled && !any_active {
                    self.sink.on_candidate_accepted(candidate);
                }
            }
            reports.push(report);
        }

        let outcome = DiscoveryOutcome {
            cancelled,
            wallets: self.sink.wallets(),
            reports,
        };

        let state = if cancelled {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        };
        self.state.settle(state);

        info!(
            "Discovery {}: {} wallets{}",
            if cancelled { "cancelled" } else { "completed" },
            outcome.wallets.len(),
            if outcome.is_degraded() { " (degraded)" } else { "" }
        );
        Ok(outcome)
    }
}

/// Cancels the task when the handle goes away
#[derive(Debug)]
struct CancelOnDrop(CancellationHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Caller's side of a running task
///
/// Dropping the handle cancels the task, so scanners never outlive the caller.
pub struct DiscoveryHandle {
    events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    canceller: CancellationHandle,
    state: StateCell,
    driver: JoinHandle<DiscoveryResult<DiscoveryOutcome>>,
    _guard: CancelOnDrop,
}

impl DiscoveryHandle {
    /// Next event, or `None` once the task has stopped emitting
    pub async fn next_event(&mut self) -> Option<DiscoveryEvent> {
        self.events.recv().await
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A cancellation handle that outlives `self`, e.g. for a Ctrl-C handler
    pub fn canceller(&self) -> CancellationHandle {
        self.canceller.clone()
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Wait for the task to settle, rejecting every passphrase challenge
    pub async fn await_result(mut self) -> DiscoveryResult<DiscoveryOutcome> {
        while let Some(event) = self.events.recv().await {
            if let DiscoveryEvent::PassphraseNeeded(request) = event {
                request.reject();
            }
        }
        self.join().await
    }

    /// Drive the task through an observer until it settles
    ///
    /// A prompt still open when the task is cancelled is abandoned.
    pub async fn run_with<O>(mut self, observer: &O) -> DiscoveryResult<DiscoveryOutcome>
    where
        O: DiscoveryObserver + ?Sized,
    {
        while let Some(event) = self.events.recv().await {
            match event {
                DiscoveryEvent::Progress(progress) => observer.on_progress(&progress),
                DiscoveryEvent::WalletFound(wallet) => observer.on_wallet_found(&wallet),
                DiscoveryEvent::PassphraseNeeded(mut request) => {
                    let title = request.title().to_string();
                    let subtitle = request.subtitle().to_string();
                    let answer = tokio::select! {
                        answer = observer.on_passphrase_needed(&title, &subtitle) => Some(answer),
                        _ = request.abandoned() => None,
                    };
                    match answer {
                        Some(Ok(passphrase)) => request.provide(passphrase.as_str()),
                        Some(Err(PromptRejected)) => request.reject(),
                        None => debug!("Passphrase prompt abandoned"),
                    }
                }
            }
        }
        self.join().await
    }

    async fn join(self) -> DiscoveryResult<DiscoveryOutcome> {
        match self.driver.await {
            Ok(result) => result,
            Err(err) => {
                self.state.settle(TaskState::Failed);
                Err(DiscoveryError::TaskAborted {
                    reason: err.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for DiscoveryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Start discovering the wallets behind `text`
///
/// Must be called from within a tokio runtime. Invalid import text settles
/// the task as `Failed` immediately; the error is returned by
/// [`DiscoveryHandle::await_result`].
pub fn start_discovery(
    text: &str,
    options: DiscoveryOptions,
    config: DiscoveryConfig,
    oracle: Arc<dyn ActivityOracle>,
) -> DiscoveryHandle {
    let (cancel, canceller) = DiscoveryCancellation::create_pair();
    let (events, receiver) = mpsc::unbounded_channel();
    let state = StateCell::new();
    let sink = Arc::new(TaskSink::new(events));

    let driver = match DiscoveryTask::new(
        text,
        options,
        config,
        oracle,
        cancel,
        sink,
        state.clone(),
    ) {
        Ok(task) => tokio::spawn(task.run()),
        Err(err) => {
            warn!("Discovery not started: {}", err);
            state.settle(TaskState::Failed);
            tokio::spawn(async move { Err(err) })
        }
    };

    DiscoveryHandle {
        events: receiver,
        canceller: canceller.clone(),
        state,
        driver,
        _guard: CancelOnDrop(canceller),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanning::MockActivityOracle;

    #[test]
    fn test_state_settles_once() {
        let state = StateCell::new();
        assert_eq!(state.get(), TaskState::Running);
        assert!(state.settle(TaskState::Cancelled));
        assert!(!state.settle(TaskState::Completed));
        assert_eq!(state.get(), TaskState::Cancelled);
        assert!(state.get().is_terminal());
    }

    #[tokio::test]
    async fn test_invalid_text_fails_immediately() {
        let handle = start_discovery(
            "definitely not a wallet",
            DiscoveryOptions::default(),
            DiscoveryConfig::default(),
            Arc::new(MockActivityOracle::new()),
        );
        assert_eq!(handle.state(), TaskState::Failed);
        let err = handle.await_result().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidSecretFormat { .. }));
    }

    #[tokio::test]
    async fn test_state_completed_after_settling() {
        let mut handle = start_discovery(
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH",
            DiscoveryOptions::default(),
            DiscoveryConfig::default(),
            Arc::new(MockActivityOracle::new()),
        );
        while handle.next_event().await.is_some() {}
        let canceller = handle.canceller();
        let state = handle.state.clone();
        let outcome = handle.await_result().await.unwrap();
        assert_eq!(state.get(), TaskState::Completed);

        // cancelling a settled task changes nothing
        canceller.cancel();
        assert_eq!(state.get(), TaskState::Completed);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.wallets.len(), 1);
        assert!(outcome.wallets[0].is_watch_only());
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_task() {
        let oracle = MockActivityOracle::new();
        oracle.hold_responses();

        let handle = start_discovery(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            DiscoveryOptions::default(),
            DiscoveryConfig::default(),
            Arc::new(oracle.clone()),
        );
        oracle.wait_for_calls(1).await;
        let canceller = handle.canceller();
        let state = handle.state.clone();

        drop(handle);
        assert!(canceller.is_cancelled());

        oracle.release_responses();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(state.get(), TaskState::Cancelled);
    }
}
