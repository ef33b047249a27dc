//! Submissions as they travel from a participant, through the mix, into storage.

use core::fmt;
use std::time::Instant;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    aead::EncryptedResponse,
    cds::{DisclosureCommitment, DisclosureKey, DisclosurePackage},
    credential::{Credential, Pseudonym},
    prf,
};

pub const SUBMISSION_ID_LEN: usize = 16;
pub const SUBMISSION_KEY_LEN: usize = 16;

/// Fresh random identifier of a single submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub [u8; SUBMISSION_ID_LEN]);

impl SubmissionId {
    pub fn random<R>(rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let mut bytes = [0u8; SUBMISSION_ID_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SUBMISSION_ID_LEN] {
        &self.0
    }
}

/// One-time key encrypting a single response. Lives only in the participant's process, or
/// transiently in the collector's after an authorized disclosure.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SubmissionKey([u8; SUBMISSION_KEY_LEN]);

impl SubmissionKey {
    /// `Hash(secret ‖ submission_id)`, truncated to the key length.
    pub fn derive(credential: &Credential, id: &SubmissionId) -> Self {
        let mut digest = prf::hash(&[credential.secret().as_slice(), id.as_bytes()]);
        let mut key = [0u8; SUBMISSION_KEY_LEN];
        key.copy_from_slice(&digest[..SUBMISSION_KEY_LEN]);
        digest.zeroize();
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; SUBMISSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns `None` unless `bytes` is exactly the key length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.try_into().ok()?))
    }

    pub fn as_bytes(&self) -> &[u8; SUBMISSION_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubmissionKey(..)")
    }
}

/// A prepared submission, as handed from a participant to the collector.
#[derive(Clone, Debug)]
pub struct Submission {
    pub submission_id: SubmissionId,
    pub pseudonym: Pseudonym,
    pub encrypted_response: EncryptedResponse,
    pub disclosure_package: DisclosurePackage,
    pub disclosure_key: DisclosureKey,
    pub predicate: DisclosureCommitment,
    /// Set when the submission enters the mix, and dropped by [Submission::into_record].
    pub arrival_time: Option<Instant>,
}

impl Submission {
    /// `Prepared` until the collector stamps the submission on entry to the mix.
    pub fn state(&self) -> SubmissionState {
        match self.arrival_time {
            None => SubmissionState::Prepared,
            Some(_) => SubmissionState::Queued,
        }
    }

    /// Strip mix-only metadata, producing the shape that is persisted.
    pub fn into_record(self) -> SubmissionRecord {
        let Submission {
            submission_id,
            pseudonym,
            encrypted_response,
            disclosure_package,
            disclosure_key,
            predicate,
            arrival_time: _,
        } = self;
        SubmissionRecord {
            submission_id,
            pseudonym,
            encrypted_response,
            disclosure_package,
            disclosure_key,
            predicate,
        }
    }
}

/// Collector-visible persisted record. Carries no arrival time, identity or submission key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    pub pseudonym: Pseudonym,
    pub encrypted_response: EncryptedResponse,
    pub disclosure_package: DisclosurePackage,
    pub disclosure_key: DisclosureKey,
    pub predicate: DisclosureCommitment,
}

/// Lifecycle of a submission.
///
/// `Prepared` is only reported by [Submission::state] on the participant's side. The collector
/// first sees a submission once it is `Queued` in the mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    Prepared,
    Queued,
    Released,
    DisclosureRequested,
    Disclosed,
    DisclosureDenied,
}
