//! Anonymous submissions with conditional disclosure.
//!
//! Participants register for a pseudonym, encrypt each response under a one-time key derived
//! from their credential, and seal that key for conditional disclosure. Submissions pass through
//! a threshold mix before the collector stores them, and a response is only decrypted once its
//! submitter authorizes disclosure of that specific submission.

// TODO: Replace the boolean disclosure authorization with a capability the submitter signs, so
// the stored disclosure key alone is no longer sufficient to unseal.

pub mod aead;
pub mod cds;
pub mod collector;
pub mod credential;
pub mod error;
pub mod mix;
pub mod prf;
pub mod proof;
pub mod submission;

pub use collector::{Collector, CollectorConfig, Receipt, SubmissionSummary};
pub use credential::{Credential, MasterSecret, Pseudonym, Registrar, Registration};
pub use error::{Error, Result};
pub use mix::{MixConfig, MixStage};
pub use proof::{CredentialProof, ProofSystem};
pub use submission::{Submission, SubmissionId, SubmissionRecord, SubmissionState};
