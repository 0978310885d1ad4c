//! Task-scoped passphrase challenges
//!
//! Every scanner that hits [`DerivationError::PassphraseRequired`] asks the
//! shared [`PassphraseCache`]. The first caller for a secret issues a single
//! [`PassphraseRequest`]; concurrent callers wait for the same answer. The
//! answer (or the rejection) is kept until the task ends and is never asked
//! for again.
//!
//! [`DerivationError::PassphraseRequired`]: crate::errors::DerivationError::PassphraseRequired

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, OnceCell};
use tracing::debug;
use zeroize::Zeroizing;

use crate::catalogue::WalletTypeId;
use crate::scanning::cancellation::DiscoveryCancellation;
use crate::secret::{SecretFingerprint, SecretKind};

type Answer = Option<Arc<Zeroizing<String>>>;

/// A pending passphrase challenge
///
/// Answer with [`provide`](Self::provide) or [`reject`](Self::reject).
/// Dropping the request unanswered counts as a rejection.
pub struct PassphraseRequest {
    title: String,
    subtitle: String,
    wallet_type: WalletTypeId,
    responder: oneshot::Sender<Option<Zeroizing<String>>>,
}

impl PassphraseRequest {
    fn new(
        kind: SecretKind,
        wallet_type: WalletTypeId,
        responder: oneshot::Sender<Option<Zeroizing<String>>>,
    ) -> Self {
        let (title, subtitle) = match kind {
            SecretKind::EncryptedKey => (
                "Password",
                "This private key is encrypted. Enter the password to decrypt it.",
            ),
            _ => (
                "Passphrase",
                "Enter the BIP39 passphrase that protects this seed.",
            ),
        };
        Self {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            wallet_type,
            responder,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    /// The wallet type whose scan triggered the challenge
    pub fn wallet_type(&self) -> WalletTypeId {
        self.wallet_type
    }

    /// Answer the challenge
    pub fn provide(self, passphrase: impl Into<String>) {
        let _ = self.responder.send(Some(Zeroizing::new(passphrase.into())));
    }

    /// Decline the challenge; only the schemes that need the passphrase stop
    pub fn reject(self) {
        let _ = self.responder.send(None);
    }

    /// Resolves when nobody waits for the answer anymore (task cancelled)
    pub async fn abandoned(&mut self) {
        self.responder.closed().await
    }

    pub fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }
}

impl fmt::Debug for PassphraseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseRequest")
            .field("title", &self.title)
            .field("wallet_type", &self.wallet_type)
            .finish()
    }
}

/// Result of asking the cache for a passphrase
#[derive(Clone)]
pub enum PassphraseOutcome {
    Provided(Arc<Zeroizing<String>>),
    Rejected,
    Cancelled,
}

impl fmt::Debug for PassphraseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassphraseOutcome::Provided(_) => write!(f, "Provided(<redacted>)"),
            PassphraseOutcome::Rejected => write!(f, "Rejected"),
            PassphraseOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Default)]
struct Slot {
    answer: OnceCell<Answer>,
    wrong: AtomicBool,
}

/// Write-once passphrase store shared by all scanners of a task
#[derive(Default)]
pub struct PassphraseCache {
    slots: Mutex<HashMap<SecretFingerprint, Arc<Slot>>>,
    prompts: AtomicUsize,
}

impl PassphraseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, fingerprint: SecretFingerprint) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(fingerprint).or_default().clone()
    }

    /// Store a passphrase supplied up front; no prompt will be issued for this secret
    pub fn seed(&self, fingerprint: SecretFingerprint, passphrase: Zeroizing<String>) {
        let _ = self
            .slot(fingerprint)
            .answer
            .set(Some(Arc::new(passphrase)));
    }

    /// Record that the cached passphrase failed to decrypt the secret
    ///
    /// Later requests for the same secret are rejected without prompting.
    pub fn mark_wrong(&self, fingerprint: SecretFingerprint) {
        self.slot(fingerprint).wrong.store(true, Ordering::SeqCst);
    }

    /// Number of challenges issued so far
    pub fn prompts_issued(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Get the passphrase for `fingerprint`, issuing at most one challenge per secret
    ///
    /// `emit` delivers the challenge to whoever answers it and returns false
    /// when nobody is listening, which counts as a rejection. The wait is
    /// abandoned as soon as `cancel` fires.
    pub async fn obtain<F>(
        &self,
        fingerprint: SecretFingerprint,
        kind: SecretKind,
        wallet_type: WalletTypeId,
        cancel: &DiscoveryCancellation,
        emit: F,
    ) -> PassphraseOutcome
    where
        F: FnOnce(PassphraseRequest) -> bool,
    {
        let slot = self.slot(fingerprint);
        if slot.wrong.load(Ordering::SeqCst) {
            return PassphraseOutcome::Rejected;
        }

        let prompts = &self.prompts;
        let ask = move || async move {
            let (responder, answer) = oneshot::channel();
            prompts.fetch_add(1, Ordering::SeqCst);
            debug!("Requesting passphrase for {}", wallet_type);
            if !emit(PassphraseRequest::new(kind, wallet_type, responder)) {
                return None;
            }
            match answer.await {
                Ok(Some(passphrase)) => Some(Arc::new(passphrase)),
                _ => None,
            }
        };

        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PassphraseOutcome::Cancelled,
            answer = slot.answer.get_or_init(ask) => answer.clone(),
        };

        match answer {
            Some(_) if slot.wrong.load(Ordering::SeqCst) => PassphraseOutcome::Rejected,
            Some(passphrase) => PassphraseOutcome::Provided(passphrase),
            None => PassphraseOutcome::Rejected,
        }
    }
}

impl fmt::Debug for PassphraseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseCache")
            .field("prompts", &self.prompts_issued())
            .finish()
    }
}
