//! Candidate wallets and their activity classification

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalogue::{UnusedPolicy, WalletTypeId};
use crate::derivation::DerivedKeyMaterial;

/// Activity classification of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Not classified yet, or the oracle could not answer
    Unknown,
    /// Has on-chain history
    Active,
    /// Provably unused
    Inactive,
    /// Key material could not be derived
    Failed,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Unknown => write!(f, "unknown"),
            Classification::Active => write!(f, "active"),
            Classification::Inactive => write!(f, "inactive"),
            Classification::Failed => write!(f, "failed"),
        }
    }
}

/// One derived wallet instance under examination
///
/// Owns its key material exclusively. The classification can be set once;
/// a candidate that ends up neither active nor offered is dropped and its
/// material wiped.
#[derive(Debug)]
pub struct Candidate {
    label: &'static str,
    material: DerivedKeyMaterial,
    classification: Classification,
    classified: bool,
}

impl Candidate {
    pub fn new(label: &'static str, material: DerivedKeyMaterial) -> Self {
        Self {
            label,
            material,
            classification: Classification::Unknown,
            classified: false,
        }
    }

    pub fn wallet_type(&self) -> WalletTypeId {
        self.material.wallet_type
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn index(&self) -> u32 {
        self.material.index
    }

    pub fn material(&self) -> &DerivedKeyMaterial {
        &self.material
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn is_classified(&self) -> bool {
        self.classified
    }

    /// Set the classification; returns false (and changes nothing) if already set
    pub fn classify(&mut self, classification: Classification) -> bool {
        if self.classified {
            return false;
        }
        self.classification = classification;
        self.classified = true;
        true
    }

    /// Whether this candidate is emitted as soon as it is classified
    ///
    /// Active candidates always are. The canonical first candidate of a
    /// scheme is offered when provably unused and the policy is
    /// [`UnusedPolicy::Always`]; an `Unknown` answer is never offered.
    pub fn is_offered(&self, policy: UnusedPolicy) -> bool {
        match self.classification {
            Classification::Active => true,
            Classification::Inactive => self.index() == 0 && policy == UnusedPolicy::Always,
            Classification::Unknown | Classification::Failed => false,
        }
    }

    /// Whether this candidate is held back until settlement under [`UnusedPolicy::Fallback`]
    pub fn is_fallback(&self, policy: UnusedPolicy) -> bool {
        self.classification == Classification::Inactive
            && self.index() == 0
            && policy == UnusedPolicy::Fallback
    }

    pub fn into_material(self) -> DerivedKeyMaterial {
        self.material
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::descriptor;
    use crate::derivation::DerivationEngine;
    use crate::secret::ImportSecret;
    use bitcoin::Network;

    fn candidate(index: u32) -> Candidate {
        let secret = ImportSecret::parse(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            Network::Bitcoin,
            false,
        );
        let bip84 = descriptor(WalletTypeId::HdSegwitBech32);
        let material = DerivationEngine::new(Network::Bitcoin, 1)
            .derive(&secret, None, bip84, index)
            .unwrap();
        Candidate::new(bip84.label, material)
    }

    #[test]
    fn test_classification_is_set_once() {
        let mut candidate = candidate(0);
        assert!(!candidate.is_classified());
        assert!(candidate.classify(Classification::Inactive));
        assert!(!candidate.classify(Classification::Active));
        assert_eq!(candidate.classification(), Classification::Inactive);
    }

    #[test]
    fn test_offer_policy() {
        let mut first = candidate(0);
        first.classify(Classification::Inactive);
        assert!(first.is_offered(UnusedPolicy::Always));
        assert!(!first.is_offered(UnusedPolicy::Fallback));
        assert!(first.is_fallback(UnusedPolicy::Fallback));
        assert!(!first.is_offered(UnusedPolicy::Never));

        let mut second = candidate(1);
        second.classify(Classification::Inactive);
        assert!(!second.is_offered(UnusedPolicy::Always));

        let mut active = candidate(1);
        active.classify(Classification::Active);
        assert!(active.is_offered(UnusedPolicy::Never));

        let mut unknown = candidate(0);
        unknown.classify(Classification::Unknown);
        assert!(!unknown.is_offered(UnusedPolicy::Always));
        assert!(!unknown.is_fallback(UnusedPolicy::Fallback));
    }
}
