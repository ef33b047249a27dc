//! Credential possession proofs.
//!
//! [ProofSystem] is the single seam through which the collector checks that a registering
//! participant holds the credential secret behind a pseudonym. Two systems exist:
//!
//! * [ProofSystem::StubAlwaysAccept] builds a commitment/challenge/response transcript and
//!   accepts it unconditionally. It is a placeholder and provides NO assurance: anyone can
//!   produce an accepted proof without knowing any secret.
//! * [ProofSystem::SchnorrDiscreteLog] is a non-interactive Schnorr proof of knowledge of
//!   `x = H(secret)` with `X = x * B`, where `B` is hashed to the group from the pseudonym. `B` is
//!   fresh for every registration, so the published `X` values of two registrations of the same
//!   identity cannot be linked without breaking DDH.

use core::fmt;

use blake2::{Blake2b512, Digest};
use curve25519_dalek::{
    ristretto::CompressedRistretto, traits::IsIdentity, RistrettoPoint, Scalar as RistrettoScalar,
};
use lox_zkp::{
    toolbox::{prover::Prover, verifier::Verifier, SchnorrCS},
    CompactProof, Transcript,
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{
    credential::{Credential, Pseudonym},
    error::{Error, Result},
    prf::{self, OUTPUT_LEN},
};

/// Selects how credential possession is proven at registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProofSystem {
    /// Reference placeholder. Verification accepts every well-formed stub proof.
    #[default]
    StubAlwaysAccept,
    /// Schnorr proof of knowledge of a discrete log, bound to the pseudonym.
    SchnorrDiscreteLog,
}

/// A proof produced by one of the [ProofSystem] variants.
#[derive(Clone)]
pub enum CredentialProof {
    Stub {
        commitment: [u8; OUTPUT_LEN],
        response: [u8; OUTPUT_LEN],
    },
    Schnorr {
        public: CompressedRistretto,
        proof: CompactProof,
    },
}

impl fmt::Debug for CredentialProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialProof::Stub { commitment, .. } => f
                .debug_struct("Stub")
                .field("commitment", commitment)
                .finish_non_exhaustive(),
            CredentialProof::Schnorr { public, .. } => f
                .debug_struct("Schnorr")
                .field("public", public)
                .finish_non_exhaustive(),
        }
    }
}

impl ProofSystem {
    pub fn prove<R>(
        &self,
        credential: &Credential,
        pseudonym: &Pseudonym,
        rng: &mut R,
    ) -> CredentialProof
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        match self {
            ProofSystem::StubAlwaysAccept => stub::prove(credential, rng),
            ProofSystem::SchnorrDiscreteLog => schnorr::prove(credential, pseudonym),
        }
    }

    /// Check `proof` against `pseudonym`. A proof from a different system is rejected.
    pub fn verify(&self, pseudonym: &Pseudonym, proof: &CredentialProof) -> Result<()> {
        match (self, proof) {
            (ProofSystem::StubAlwaysAccept, CredentialProof::Stub { commitment, .. }) => {
                stub::verify(commitment);
                Ok(())
            }
            (ProofSystem::SchnorrDiscreteLog, CredentialProof::Schnorr { public, proof }) => {
                schnorr::verify(pseudonym, public, proof)
            }
            _ => Err(Error::ProofRejected),
        }
    }
}

mod stub {
    use super::*;

    pub(super) fn prove<R>(credential: &Credential, rng: &mut R) -> CredentialProof
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let mut r = [0u8; 32];
        rng.fill_bytes(&mut r);
        let commitment = prf::hash(&[credential.secret().as_slice(), &r]);
        let challenge = prf::hash(&[commitment.as_slice()]);
        let response = prf::prf(credential.secret(), &[challenge.as_slice(), &r]);
        r.zeroize();
        CredentialProof::Stub {
            commitment,
            response,
        }
    }

    // NOTE: No relation between commitment and response is checked. There is no sound relation to
    // check for this transcript, so acceptance is unconditional.
    pub(super) fn verify(commitment: &[u8; OUTPUT_LEN]) {
        let _challenge = prf::hash(&[commitment.as_slice()]);
    }
}

mod schnorr {
    use super::*;

    // A small macro to construct the labels for variables that get added to the transcript.
    macro_rules! label {
        ($s:literal) => {
            concat!("anonize::proof::schnorr::", $s).as_bytes()
        };
    }

    fn base(pseudonym: &Pseudonym) -> RistrettoPoint {
        RistrettoPoint::from_hash(
            Blake2b512::new()
                .chain_update(label!("base"))
                .chain_update(pseudonym.as_bytes()),
        )
    }

    fn witness(credential: &Credential) -> RistrettoScalar {
        RistrettoScalar::from_hash(
            Blake2b512::new()
                .chain_update(label!("witness"))
                .chain_update(credential.secret()),
        )
    }

    fn transcript(pseudonym: &Pseudonym) -> Transcript {
        let mut transcript = Transcript::new(label!("transcript"));
        transcript.append_message(b"pseudonym", pseudonym.as_bytes());
        transcript
    }

    pub(super) fn prove(credential: &Credential, pseudonym: &Pseudonym) -> CredentialProof {
        let base = base(pseudonym);
        let mut x = witness(credential);
        let public = base * x;

        let mut transcript = transcript(pseudonym);
        let mut prover = Prover::new(label!("constraints"), &mut transcript);

        // Constrain X = x * B
        let x_var = prover.allocate_scalar(b"x", x);
        let (base_var, _) = prover.allocate_point(b"B", base);
        let (public_var, public) = prover.allocate_point(b"X", public);
        prover.constrain(public_var, vec![(x_var, base_var)]);
        x.zeroize();

        CredentialProof::Schnorr {
            public,
            proof: prover.prove_compact(),
        }
    }

    pub(super) fn verify(
        pseudonym: &Pseudonym,
        public: &CompressedRistretto,
        proof: &CompactProof,
    ) -> Result<()> {
        let point = public.decompress().ok_or(Error::ProofRejected)?;
        if point.is_identity() {
            return Err(Error::ProofRejected);
        }

        let mut transcript = transcript(pseudonym);
        let mut verifier = Verifier::new(label!("constraints"), &mut transcript);

        let x_var = verifier.allocate_scalar(b"x");
        let base_var = verifier
            .allocate_point(b"B", base(pseudonym).compress())
            .map_err(|_| Error::ProofRejected)?;
        let public_var = verifier
            .allocate_point(b"X", *public)
            .map_err(|_| Error::ProofRejected)?;
        verifier.constrain(public_var, vec![(x_var, base_var)]);

        verifier
            .verify_compact(proof)
            .map_err(|_| Error::ProofRejected)
    }
}

#[cfg(test)]
mod test {
    use super::{CredentialProof, ProofSystem};
    use crate::{
        credential::{MasterSecret, Pseudonym, Registrar},
        error::Error,
    };

    fn registrar() -> Registrar {
        Registrar::new(MasterSecret::generate(&mut rand::thread_rng()))
    }

    #[test]
    fn stub_accepts_anything_well_formed() {
        let system = ProofSystem::StubAlwaysAccept;
        let reg = registrar()
            .register("alice", system, &mut rand::thread_rng())
            .unwrap();
        system.verify(&reg.pseudonym, &reg.proof).unwrap();

        // A transcript unrelated to any credential is accepted too.
        let forged = CredentialProof::Stub {
            commitment: [0u8; 32],
            response: [0u8; 32],
        };
        system.verify(&Pseudonym([9u8; 32]), &forged).unwrap();
    }

    #[test]
    fn schnorr_success() {
        let system = ProofSystem::SchnorrDiscreteLog;
        let reg = registrar()
            .register("alice", system, &mut rand::thread_rng())
            .unwrap();
        system.verify(&reg.pseudonym, &reg.proof).unwrap();
    }

    #[test]
    fn schnorr_bound_to_pseudonym() {
        let system = ProofSystem::SchnorrDiscreteLog;
        let registrar = registrar();
        let a = registrar
            .register("alice", system, &mut rand::thread_rng())
            .unwrap();
        let b = registrar
            .register("bob", system, &mut rand::thread_rng())
            .unwrap();
        let Err(Error::ProofRejected) = system.verify(&b.pseudonym, &a.proof) else {
            panic!("proof verified against the wrong pseudonym");
        };
    }

    #[test]
    fn schnorr_public_keys_unlinkable_across_registrations() {
        let system = ProofSystem::SchnorrDiscreteLog;
        let registrar = registrar();
        let first = registrar
            .register("carol", system, &mut rand::thread_rng())
            .unwrap();
        let second = registrar
            .register("carol", system, &mut rand::thread_rng())
            .unwrap();
        let (
            CredentialProof::Schnorr { public: x1, .. },
            CredentialProof::Schnorr { public: x2, .. },
        ) = (&first.proof, &second.proof)
        else {
            panic!("schnorr system produced a non-schnorr proof");
        };
        assert_ne!(x1, x2);
    }

    #[test]
    fn mismatched_system_rejected() {
        let reg = registrar()
            .register("dave", ProofSystem::StubAlwaysAccept, &mut rand::thread_rng())
            .unwrap();
        let Err(Error::ProofRejected) =
            ProofSystem::SchnorrDiscreteLog.verify(&reg.pseudonym, &reg.proof)
        else {
            panic!("stub proof accepted by the schnorr system");
        };
    }
}
