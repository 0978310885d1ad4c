//! Mock activity oracle for deterministic testing
//!
//! [`MockActivityOracle`] answers from an in-memory set of active targets and
//! can simulate the failure modes a real indexer shows: every call failing,
//! specific targets failing, slow responses and responses that hang until the
//! test releases them. Every call is logged so tests can assert exactly what
//! was asked, and when.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::OracleError;
use crate::scanning::oracle::{Activity, ActivityOracle, ActivityTarget};

/// Simulated failure modes
#[derive(Debug, Clone, Default)]
pub struct MockOracleFailureModes {
    /// Fail every call with a network error
    pub fail_all: bool,
    /// Fail the next N calls, then answer normally
    pub fail_next_calls: usize,
    /// Fail every call about these targets
    pub failing_targets: HashSet<String>,
    /// Delay every answer
    pub latency: Option<Duration>,
}

/// In-memory oracle
#[derive(Debug, Clone)]
pub struct MockActivityOracle {
    active: Arc<Mutex<HashSet<String>>>,
    failure_modes: Arc<Mutex<MockOracleFailureModes>>,
    calls: Arc<Mutex<Vec<ActivityTarget>>>,
    gate: Arc<watch::Sender<bool>>,
    extended_keys: bool,
}

impl Default for MockActivityOracle {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockActivityOracle {
    /// Create an oracle for which nothing has history
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
            failure_modes: Arc::new(Mutex::new(MockOracleFailureModes::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(gate),
            extended_keys: false,
        }
    }

    /// Create an oracle reporting history for `targets`
    pub fn with_active<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oracle = Self::new();
        lock(&oracle.active).extend(targets.into_iter().map(Into::into));
        oracle
    }

    /// Answer extended public key lookups as well
    pub fn with_extended_key_support(mut self, supported: bool) -> Self {
        self.extended_keys = supported;
        self
    }

    /// Report history for an address or extended key
    pub fn mark_active(&self, target: &str) {
        lock(&self.active).insert(target.to_string());
    }

    /// Set failure mode for testing error conditions
    pub fn set_failure_mode(&self, modes: MockOracleFailureModes) {
        *lock(&self.failure_modes) = modes;
    }

    /// Get the current failure modes
    pub fn get_failure_modes(&self) -> MockOracleFailureModes {
        lock(&self.failure_modes).clone()
    }

    /// Hold every answer until [`release_responses`](Self::release_responses)
    pub fn hold_responses(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_responses(&self) {
        self.gate.send_replace(true);
    }

    /// Every target asked about, in call order
    pub fn calls(&self) -> Vec<ActivityTarget> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Wait until at least `count` calls have been issued
    pub async fn wait_for_calls(&self, count: usize) {
        while self.call_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Reset the mock to its initial state
    pub fn reset(&self) {
        lock(&self.active).clear();
        lock(&self.calls).clear();
        *lock(&self.failure_modes) = MockOracleFailureModes::default();
        self.release_responses();
    }

    fn check_failure(&self, target: &ActivityTarget) -> Result<(), OracleError> {
        let mut modes = lock(&self.failure_modes);

        if modes.fail_all {
            return Err(OracleError::network("Mock failure: all calls fail"));
        }
        if modes.fail_next_calls > 0 {
            modes.fail_next_calls -= 1;
            return Err(OracleError::network("Mock failure: scheduled failure"));
        }
        if modes.failing_targets.contains(target.as_str()) {
            return Err(OracleError::network(format!(
                "Mock failure: {}",
                target.as_str()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityOracle for MockActivityOracle {
    async fn has_history(&self, target: &ActivityTarget) -> Result<Activity, OracleError> {
        lock(&self.calls).push(target.clone());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let latency = lock(&self.failure_modes).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.check_failure(target)?;

        if let ActivityTarget::ExtendedPublicKey(_) = target {
            if !self.extended_keys {
                return Err(OracleError::Unsupported {
                    target_kind: target.kind(),
                });
            }
        }

        if lock(&self.active).contains(target.as_str()) {
            Ok(Activity::Active)
        } else {
            Ok(Activity::Inactive)
        }
    }

    fn supports_extended_keys(&self) -> bool {
        self.extended_keys
    }
}
