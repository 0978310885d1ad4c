//! Candidate scanner
//!
//! Walks the candidates of one wallet type in strictly increasing index
//! order, derives each one, asks the oracle about it and stops once
//! `gap_limit` consecutive candidates after the last active one came back
//! without history.
//!
//! Offered candidates are handed to the [`ScanListener`] the moment they are
//! classified. The scanner checks the shared cancellation token before every
//! derivation and every oracle call.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::catalogue::{WalletTypeDescriptor, WalletTypeId};
use crate::derivation::{DerivationEngine, DerivedKeyMaterial};
use crate::errors::DerivationError;
use crate::scanning::cancellation::{CancellationToken, DiscoveryCancellation};
use crate::scanning::candidate::{Candidate, Classification};
use crate::scanning::oracle::{Activity, ActivityOracle, ActivityTarget};
use crate::scanning::passphrase::{PassphraseCache, PassphraseOutcome, PassphraseRequest};
use crate::secret::ImportSecret;

/// How a scheme's scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeStatus {
    /// Walked until the gap limit or the index bound
    Completed,
    /// The secret cannot be used by this wallet type
    InvalidSecretFormat,
    /// The passphrase challenge was declined, or the passphrase was wrong
    PassphraseRejected,
    /// Stopped because the task was cancelled
    Cancelled,
    /// The scanner died unexpectedly
    Aborted,
}

impl fmt::Display for SchemeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeStatus::Completed => write!(f, "completed"),
            SchemeStatus::InvalidSecretFormat => write!(f, "invalid secret format"),
            SchemeStatus::PassphraseRejected => write!(f, "passphrase rejected"),
            SchemeStatus::Cancelled => write!(f, "cancelled"),
            SchemeStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Per-scheme summary attached to the task outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeReport {
    pub wallet_type: WalletTypeId,
    pub status: SchemeStatus,
    /// Candidates classified (including failed derivations)
    pub examined: u32,
    pub active: u32,
    /// Candidates left `Unknown` because the oracle failed
    pub unknown: u32,
}

impl SchemeReport {
    pub fn new(wallet_type: WalletTypeId, status: SchemeStatus) -> Self {
        Self {
            wallet_type,
            status,
            examined: 0,
            active: 0,
            unknown: 0,
        }
    }

    /// Some candidate could not be classified because of oracle failures
    pub fn is_degraded(&self) -> bool {
        self.unknown > 0
    }
}

/// Where a scanner currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Started,
    AwaitingPassphrase,
    Classified(Classification),
    Finished(SchemeStatus),
}

/// One step reported by a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStep {
    pub wallet_type: WalletTypeId,
    pub label: &'static str,
    pub index: u32,
    pub stage: ScanStage,
}

/// Receives what scanners produce
///
/// Implemented by the discovery task; every method is called from the
/// scanner's own task and must not block.
pub trait ScanListener: Send + Sync {
    /// Called for every scanner step, at least once per classified candidate
    fn on_step(&self, step: &ScanStep);

    /// Called once per offered candidate, right after its classification
    fn on_candidate_accepted(&self, candidate: Candidate);

    /// Deliver a passphrase challenge; return false if nobody can answer it
    fn on_passphrase_needed(&self, request: PassphraseRequest) -> bool;
}

/// Probe settings shared by all scanners of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Receive addresses asked about per candidate
    pub address_probe_depth: u32,
    /// Ask about the account xpub first when the oracle supports it
    pub probe_extended_keys: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            address_probe_depth: 1,
            probe_extended_keys: true,
        }
    }
}

/// Shared state every scanner of one task borrows
#[derive(Clone)]
pub struct ScanContext {
    pub secret: Arc<ImportSecret>,
    pub engine: Arc<DerivationEngine>,
    pub oracle: Arc<dyn ActivityOracle>,
    pub passphrases: Arc<PassphraseCache>,
    pub cancel: DiscoveryCancellation,
    pub listener: Arc<dyn ScanListener>,
    pub settings: ScanSettings,
}

/// What a finished scanner hands back to the task
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: SchemeReport,
    /// Unused first candidate held back under `UnusedPolicy::Fallback`
    pub fallback: Option<Candidate>,
}

/// Scans one wallet type
pub struct CandidateScanner {
    ctx: ScanContext,
    descriptor: WalletTypeDescriptor,
}

impl CandidateScanner {
    pub fn new(ctx: ScanContext, descriptor: WalletTypeDescriptor) -> Self {
        Self { ctx, descriptor }
    }

    pub fn wallet_type(&self) -> WalletTypeId {
        self.descriptor.id
    }

    /// Run the scan to completion, cancellation or the first scheme-fatal error
    pub async fn run(self) -> ScanOutcome {
        let mut report = SchemeReport::new(self.descriptor.id, SchemeStatus::Completed);
        let mut fallback = None;

        debug!(
            "Scanning {} (gap limit {}, up to {} candidates)",
            self.descriptor.id,
            self.descriptor.gap_limit,
            self.descriptor.scan_bound()
        );
        self.step(0, ScanStage::Started);

        let (status, last_index) = self.walk(&mut report, &mut fallback).await;
        report.status = status;

        self.step(last_index, ScanStage::Finished(status));
        info!(
            "Finished {}: {} ({} examined, {} active, {} unknown)",
            self.descriptor.id, status, report.examined, report.active, report.unknown
        );

        ScanOutcome { report, fallback }
    }

    async fn walk(
        &self,
        report: &mut SchemeReport,
        fallback: &mut Option<Candidate>,
    ) -> (SchemeStatus, u32) {
        let descriptor = &self.descriptor;
        let gap_limit = descriptor.gap_limit.max(1);
        let mut passphrase: Option<Arc<Zeroizing<String>>> = None;
        let mut misses = 0u32;

        for index in 0..descriptor.scan_bound() {
            if self.ctx.cancel.is_cancelled() {
                return (SchemeStatus::Cancelled, index);
            }

            let material = match self.derive(index, &mut passphrase).await {
                Ok(material) => material,
                Err(status) => return (status, index),
            };

            let classification = match &material {
                Some(material) => match self.probe(material).await {
                    Some(classification) => classification,
                    None => return (SchemeStatus::Cancelled, index),
                },
                None => Classification::Failed,
            };

            report.examined += 1;
            match classification {
                Classification::Active => {
                    report.active += 1;
                    misses = 0;
                }
                Classification::Unknown => {
                    report.unknown += 1;
                    misses += 1;
                }
                Classification::Inactive | Classification::Failed => misses += 1,
            }

            debug!("{} #{} classified {}", descriptor.id, index, classification);
            self.step(index, ScanStage::Classified(classification));

            if let Some(material) = material {
                let mut candidate = Candidate::new(descriptor.label, material);
                candidate.classify(classification);
                if candidate.is_offered(descriptor.unused_policy) {
                    self.ctx.listener.on_candidate_accepted(candidate);
                } else if candidate.is_fallback(descriptor.unused_policy) {
                    *fallback = Some(candidate);
                }
            }

            if misses >= gap_limit {
                return (SchemeStatus::Completed, index);
            }
        }

        (SchemeStatus::Completed, descriptor.scan_bound().saturating_sub(1))
    }

    /// Derive candidate `index`, running the passphrase challenge if needed
    ///
    /// `Ok(None)` means the candidate itself failed and the walk goes on;
    /// `Err` ends the scheme.
    async fn derive(
        &self,
        index: u32,
        passphrase: &mut Option<Arc<Zeroizing<String>>>,
    ) -> Result<Option<DerivedKeyMaterial>, SchemeStatus> {
        let descriptor = &self.descriptor;
        loop {
            let attempt = self.ctx.engine.derive(
                &self.ctx.secret,
                passphrase.as_deref().map(|p| p.as_str()),
                descriptor,
                index,
            );

            match attempt {
                Ok(material) => return Ok(Some(material)),
                Err(DerivationError::PassphraseRequired { .. }) if passphrase.is_none() => {
                    self.step(index, ScanStage::AwaitingPassphrase);
                    let listener = self.ctx.listener.clone();
                    let outcome = self
                        .ctx
                        .passphrases
                        .obtain(
                            self.ctx.secret.fingerprint(),
                            self.ctx.secret.kind(),
                            descriptor.id,
                            &self.ctx.cancel,
                            move |request| listener.on_passphrase_needed(request),
                        )
                        .await;
                    match outcome {
                        PassphraseOutcome::Provided(answer) => *passphrase = Some(answer),
                        PassphraseOutcome::Rejected => {
                            debug!("Passphrase declined, skipping {}", descriptor.id);
                            return Err(SchemeStatus::PassphraseRejected);
                        }
                        PassphraseOutcome::Cancelled => return Err(SchemeStatus::Cancelled),
                    }
                }
                Err(DerivationError::WrongPassphrase) => {
                    warn!("Wrong passphrase for {}", descriptor.id);
                    self.ctx.passphrases.mark_wrong(self.ctx.secret.fingerprint());
                    return Err(SchemeStatus::PassphraseRejected);
                }
                Err(err) if err.is_format_error() => {
                    debug!("Skipping {}: {}", descriptor.id, err);
                    return Err(SchemeStatus::InvalidSecretFormat);
                }
                Err(err) => {
                    warn!("Derivation of {} #{} failed: {}", descriptor.id, index, err);
                    return Ok(None);
                }
            }
        }
    }

    /// Ask the oracle about a candidate; `None` when cancelled
    async fn probe(&self, material: &DerivedKeyMaterial) -> Option<Classification> {
        let settings = self.ctx.settings;
        let mut targets = Vec::new();
        if settings.probe_extended_keys && self.ctx.oracle.supports_extended_keys() {
            if let Some(key) = &material.extended_public_key {
                targets.push(ActivityTarget::ExtendedPublicKey(key.clone()));
            }
        }
        targets.extend(
            material
                .addresses
                .iter()
                .take(settings.address_probe_depth.max(1) as usize)
                .cloned()
                .map(ActivityTarget::Address),
        );

        let mut degraded = false;
        for target in &targets {
            if self.ctx.cancel.is_cancelled() {
                return None;
            }
            let answer = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return None,
                answer = self.ctx.oracle.has_history(target) => answer,
            };
            match answer {
                Ok(Activity::Active) => return Some(Classification::Active),
                Ok(Activity::Inactive) => {}
                Err(err) => {
                    warn!(
                        "{} lookup for {} #{} failed: {}",
                        target.kind(),
                        self.descriptor.id,
                        material.index,
                        err
                    );
                    degraded = true;
                }
            }
        }

        if self.ctx.cancel.is_cancelled() {
            return None;
        }
        Some(if degraded {
            Classification::Unknown
        } else {
            Classification::Inactive
        })
    }

    fn step(&self, index: u32, stage: ScanStage) {
        self.ctx.listener.on_step(&ScanStep {
            wallet_type: self.descriptor.id,
            label: self.descriptor.label,
            index,
            stage,
        });
    }
}
