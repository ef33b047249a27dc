//! Pseudonymous credential issuance.
//!
//! A participant's credential secret is `PRF(master_secret, identity)`. Each registration then
//! publishes `pseudonym = Hash(secret ‖ nonce)` under a fresh random nonce, so two registrations
//! of one identity share a secret but expose unlinkable pseudonyms.

use core::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::{Error, Result},
    prf::{self, KEY_LEN, OUTPUT_LEN},
    proof::{CredentialProof, ProofSystem},
};

/// Length of the per-registration nonce mixed into the pseudonym.
pub const REGISTRATION_NONCE_LEN: usize = 16;

/// Process-wide secret from which every credential is derived.
///
/// Generated once at process start and held for the lifetime of the registrar. Zeroized on drop,
/// redacted in `Debug` and never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret([u8; KEY_LEN]);

impl MasterSecret {
    pub fn generate<R>(rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let mut bytes = [0u8; KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Use a fixed master secret, e.g. one restored from a sealed key store.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// Participant-side credential. Never transmitted to the collector.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    identity: String,
    secret: [u8; OUTPUT_LEN],
}

impl Credential {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &[u8; OUTPUT_LEN] {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").finish_non_exhaustive()
    }
}

/// Public, collector-visible identifier standing in for a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pseudonym(pub [u8; OUTPUT_LEN]);

impl Pseudonym {
    pub fn as_bytes(&self) -> &[u8; OUTPUT_LEN] {
        &self.0
    }
}

/// Everything a participant walks away with from a registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub credential: Credential,
    pub pseudonym: Pseudonym,
    pub proof: CredentialProof,
}

/// Issues credentials and pseudonyms from a [MasterSecret].
#[derive(Debug)]
pub struct Registrar {
    master: MasterSecret,
}

impl Registrar {
    pub fn new(master: MasterSecret) -> Self {
        Self { master }
    }

    /// Recompute the credential secret for `identity`.
    ///
    /// Deterministic under a fixed master secret, which lets a participant rederive their own
    /// secret from the identity alone. Re-registering an unchanged identity therefore always
    /// yields the same secret, even though each registration publishes a new pseudonym.
    pub fn credential(&self, identity: &str) -> Result<Credential> {
        if identity.is_empty() {
            return Err(Error::EmptyIdentity);
        }
        Ok(Credential {
            identity: identity.to_owned(),
            secret: prf::prf(&self.master.0, &[identity.as_bytes()]),
        })
    }

    /// Register `identity`, producing a credential, a fresh pseudonym and a possession proof.
    pub fn register<R>(
        &self,
        identity: &str,
        proof_system: ProofSystem,
        rng: &mut R,
    ) -> Result<Registration>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let credential = self.credential(identity)?;

        let mut nonce = [0u8; REGISTRATION_NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        let pseudonym = Pseudonym(prf::hash(&[credential.secret().as_slice(), &nonce]));

        let proof = proof_system.prove(&credential, &pseudonym, rng);
        debug!(?proof_system, "issued pseudonymous credential");

        Ok(Registration {
            credential,
            pseudonym,
            proof,
        })
    }
}
