//! The collecting party: registration, submission intake through the mix, storage and
//! authorized disclosure.
//!
//! Lifecycle of one submission:
//!
//! ```text
//! Prepared --submit--> Queued --batch released + jitter--> Released
//!     --request_disclosure--> DisclosureRequested --> Disclosed | DisclosureDenied
//! ```
//!
//! Storage indices follow release order, which is decorrelated from submission order. Callers
//! that need to find a particular submission must go by [SubmissionId], never by position.

use std::{collections::HashSet, sync::Arc, time::Instant};

use parking_lot::{Mutex, RwLock};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    aead::{Aes128GcmCipher, ResponseCipher},
    cds,
    credential::{Credential, MasterSecret, Pseudonym, Registrar, Registration},
    error::{Error, Result},
    mix::{MixConfig, MixStage, Scheduled},
    proof::ProofSystem,
    submission::{Submission, SubmissionId, SubmissionKey, SubmissionRecord, SubmissionState},
};

pub const DEFAULT_PREDICATE: &str = "Grant permission to decrypt this response";

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub mix: MixConfig,
    pub proof_system: ProofSystem,
    /// Human-readable condition every disclosure commitment is made against.
    pub predicate: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mix: MixConfig::default(),
            proof_system: ProofSystem::default(),
            predicate: DEFAULT_PREDICATE.to_owned(),
        }
    }
}

impl CollectorConfig {
    pub fn with_mix(mut self, mix: MixConfig) -> Self {
        self.mix = mix;
        self
    }

    pub fn with_proof_system(mut self, proof_system: ProofSystem) -> Self {
        self.proof_system = proof_system;
        self
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = predicate.into();
        self
    }
}

/// Acknowledgement that a submission entered the mix. It is not yet in storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub submission_id: SubmissionId,
}

/// What the administrative listing shows for a stored submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub index: usize,
    pub pseudonym: Pseudonym,
    pub ciphertext_len: usize,
    pub state: SubmissionState,
}

#[derive(Debug)]
struct Stored {
    record: SubmissionRecord,
    state: SubmissionState,
}

pub struct Collector<C = Aes128GcmCipher> {
    config: CollectorConfig,
    registrar: Registrar,
    cipher: C,
    pseudonyms: RwLock<HashSet<Pseudonym>>,
    mix: MixStage<Submission>,
    storage: Arc<RwLock<Vec<Stored>>>,
    /// Submissions accepted into the mix but not yet persisted.
    in_flight: Arc<Mutex<HashSet<SubmissionId>>>,
    /// Release tasks not yet awaited by [Collector::settle]. Finished ones are pruned on submit.
    releases: Mutex<Vec<JoinHandle<()>>>,
}

impl Collector<Aes128GcmCipher> {
    pub fn new(master: MasterSecret, config: CollectorConfig) -> Self {
        Self::with_cipher(master, config, Aes128GcmCipher)
    }
}

impl<C: ResponseCipher> Collector<C> {
    pub fn with_cipher(master: MasterSecret, config: CollectorConfig, cipher: C) -> Self {
        Self {
            mix: MixStage::new(config.mix.clone()),
            config,
            registrar: Registrar::new(master),
            cipher,
            pseudonyms: RwLock::new(HashSet::new()),
            storage: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            releases: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Register a participant and admit their pseudonym once its possession proof verifies.
    ///
    /// The returned [Registration] belongs to the participant. Only the pseudonym is retained.
    pub fn register(&self, identity: &str) -> Result<Registration> {
        let registration = self.registrar.register(
            identity,
            self.config.proof_system,
            &mut rand::thread_rng(),
        )?;
        self.config
            .proof_system
            .verify(&registration.pseudonym, &registration.proof)?;

        let mut pseudonyms = self.pseudonyms.write();
        pseudonyms.insert(registration.pseudonym);
        info!(registered = pseudonyms.len(), "admitted pseudonym");
        Ok(registration)
    }

    /// Build a submission on the participant's side.
    ///
    /// Only reads the registered pseudonym set, so any number of participants may prepare
    /// concurrently.
    pub fn prepare(
        &self,
        credential: &Credential,
        pseudonym: &Pseudonym,
        response: &[u8],
    ) -> Result<Submission> {
        if !self.is_registered(pseudonym) {
            return Err(Error::UnregisteredPseudonym);
        }
        let mut rng = rand::thread_rng();

        let submission_id = SubmissionId::random(&mut rng);
        let key = SubmissionKey::derive(credential, &submission_id);
        let encrypted_response =
            self.cipher
                .encrypt(&key, response, submission_id.as_bytes(), &mut rng)?;

        let (disclosure_key, predicate) = cds::create_disclosure(&self.config.predicate, &mut rng);
        let disclosure_package = cds::seal(key.as_bytes(), &disclosure_key)?;

        Ok(Submission {
            submission_id,
            pseudonym: *pseudonym,
            encrypted_response,
            disclosure_package,
            disclosure_key,
            predicate,
            arrival_time: None,
        })
    }

    /// Hand a submission to the mix and release a batch if the threshold is reached.
    ///
    /// Returns as soon as the submission is buffered. Released submissions reach storage only
    /// after their individual delay, with their arrival time stripped. Fails with
    /// [Error::NoRuntime], leaving the mix untouched, when called outside a Tokio runtime.
    pub fn submit(&self, mut submission: Submission) -> Result<Receipt> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let submission_id = submission.submission_id;
        submission.arrival_time = Some(Instant::now());

        self.in_flight.lock().insert(submission_id);
        self.mix.ingest(submission);

        if let Some(batch) = self.mix.release_batch() {
            let handles: Vec<_> = batch
                .into_iter()
                .map(|Scheduled { item, delay }| {
                    let scheduled = Scheduled {
                        item: item.into_record(),
                        delay,
                    };
                    let storage = self.storage.clone();
                    let in_flight = self.in_flight.clone();
                    scheduled.spawn_on(&runtime, move |record| {
                        persist(&storage, &in_flight, record)
                    })
                })
                .collect();
            let mut releases = self.releases.lock();
            releases.retain(|handle| !handle.is_finished());
            releases.extend(handles);
        }

        Ok(Receipt { submission_id })
    }

    /// Wait until every release scheduled so far has reached storage.
    ///
    /// Submissions still waiting in the mix buffer are not affected.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.releases.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(%err, "scheduled release did not complete");
            }
        }
    }

    /// Unseal and decrypt the stored submission at `index`.
    ///
    /// `authorized` is the submitter's decision. The stored disclosure key alone can unseal the
    /// submission key, so this flag is the only access gate.
    pub fn request_disclosure(&self, index: usize, authorized: bool) -> Result<Zeroizing<Vec<u8>>> {
        let record = {
            let storage = self.storage.read();
            let len = storage.len();
            let stored = storage.get(index).ok_or(Error::InvalidIndex { index, len })?;
            stored.record.clone()
        };
        self.set_state(index, SubmissionState::DisclosureRequested);

        let result = self.disclose(&record, authorized);
        match &result {
            Ok(_) => {
                info!(index, "disclosed submission");
                self.set_state(index, SubmissionState::Disclosed);
            }
            Err(err) => {
                info!(index, %err, "disclosure refused");
                self.set_state(index, SubmissionState::DisclosureDenied);
            }
        }
        result
    }

    fn disclose(&self, record: &SubmissionRecord, authorized: bool) -> Result<Zeroizing<Vec<u8>>> {
        let key_bytes = cds::unseal(
            &record.disclosure_package,
            &record.disclosure_key,
            authorized,
        )?;
        let key = SubmissionKey::from_slice(&key_bytes).ok_or(Error::AuthenticationFailure)?;
        self.cipher.decrypt(
            &key,
            &record.encrypted_response,
            record.submission_id.as_bytes(),
        )
    }

    fn set_state(&self, index: usize, state: SubmissionState) {
        if let Some(stored) = self.storage.write().get_mut(index) {
            stored.state = state;
        }
    }

    /// Whether the stored submission at `index` was committed under the configured predicate.
    pub fn verify_predicate(&self, index: usize) -> Result<bool> {
        let storage = self.storage.read();
        let stored = storage.get(index).ok_or(Error::InvalidIndex {
            index,
            len: storage.len(),
        })?;
        Ok(stored.record.predicate.matches(&self.config.predicate))
    }

    pub fn state_of(&self, submission_id: &SubmissionId) -> Option<SubmissionState> {
        // Checked before storage: persisting removes the id only once the record is stored.
        if self.in_flight.lock().contains(submission_id) {
            return Some(SubmissionState::Queued);
        }
        self.storage
            .read()
            .iter()
            .find(|s| s.record.submission_id == *submission_id)
            .map(|s| s.state)
    }

    pub fn is_registered(&self, pseudonym: &Pseudonym) -> bool {
        self.pseudonyms.read().contains(pseudonym)
    }

    pub fn pseudonym_count(&self) -> usize {
        self.pseudonyms.read().len()
    }

    /// Submissions buffered in the mix, waiting for a full batch.
    pub fn pending_count(&self) -> usize {
        self.mix.len()
    }

    pub fn stored_count(&self) -> usize {
        self.storage.read().len()
    }

    /// Administrative listing: pseudonym and opaque ciphertext size only.
    pub fn submissions(&self) -> Vec<SubmissionSummary> {
        self.storage
            .read()
            .iter()
            .enumerate()
            .map(|(index, stored)| SubmissionSummary {
                index,
                pseudonym: stored.record.pseudonym,
                ciphertext_len: stored.record.encrypted_response.ciphertext.len(),
                state: stored.state,
            })
            .collect()
    }

    /// Snapshot of the persisted records, in storage order.
    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.storage
            .read()
            .iter()
            .map(|stored| stored.record.clone())
            .collect()
    }
}

fn persist(
    storage: &RwLock<Vec<Stored>>,
    in_flight: &Mutex<HashSet<SubmissionId>>,
    record: SubmissionRecord,
) {
    let submission_id = record.submission_id;
    let mut storage = storage.write();
    storage.push(Stored {
        record,
        state: SubmissionState::Released,
    });
    in_flight.lock().remove(&submission_id);
    debug!(stored = storage.len(), "persisted released submission");
}
