//! Candidate scanning
//!
//! The pieces one wallet-type scan is made of:
//!
//! - [`ActivityOracle`]: the external "has this been used?" lookup
//! - [`CandidateScanner`]: gap-limit walk over one wallet type
//! - [`PassphraseCache`]: task-scoped, write-once passphrase store
//! - [`DiscoveryCancellation`]: the shared cancellation flag
//!
//! With the `http` feature an [`EsploraOracle`] is available; the
//! [`mocks`] module provides an in-memory oracle for tests.

pub mod cancellation;
pub mod candidate;
#[cfg(feature = "http")]
pub mod http_oracle;
pub mod mocks;
pub mod oracle;
pub mod passphrase;
pub mod scanner;

pub use cancellation::{CancellationHandle, CancellationToken, DiscoveryCancellation};
pub use candidate::{Candidate, Classification};
#[cfg(feature = "http")]
pub use http_oracle::EsploraOracle;
pub use mocks::{MockActivityOracle, MockOracleFailureModes};
pub use oracle::{Activity, ActivityOracle, ActivityTarget};
pub use passphrase::{PassphraseCache, PassphraseOutcome, PassphraseRequest};
pub use scanner::{
    CandidateScanner, ScanContext, ScanListener, ScanOutcome, ScanSettings, ScanStage, ScanStep,
    SchemeReport, SchemeStatus,
};
