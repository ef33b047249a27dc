//! Conditional disclosure of secrets.
//!
//! A secret is sealed as a one-time pad against a keystream derived from a fresh disclosure key,
//! then authenticated with `PRF(disclosure_key, sealed)`. Unsealing checks the tag first and the
//! caller's authorization second; both checks are evaluated before either result is acted on.
//!
//! The collector stores the disclosure key in the clear, so the authorization flag is the only
//! gate between stored data and the submission key. It is a caller-supplied boolean, not a
//! cryptographically enforced capability.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::{
    error::{Error, Result},
    prf::{self, KEY_LEN, OUTPUT_LEN},
};

const PAD_INFO: &[u8] = b"anonize::cds::pad";

/// One-time key protecting a single sealed secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureKey(pub [u8; KEY_LEN]);

/// Commitment to the human-readable predicate under which disclosure may happen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureCommitment {
    pub commitment: [u8; OUTPUT_LEN],
    pub nonce: [u8; 32],
}

impl DisclosureCommitment {
    /// Whether this commitment opens to `predicate`.
    pub fn matches(&self, predicate: &str) -> bool {
        prf::hash(&[predicate.as_bytes(), &self.nonce])
            .as_slice()
            .ct_eq(self.commitment.as_slice())
            .into()
    }
}

/// Sealed form of a secret, safe to hand to the collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosurePackage {
    pub sealed_key: Vec<u8>,
    pub auth_tag: [u8; OUTPUT_LEN],
}

/// Generate a fresh disclosure key and a commitment to `predicate`.
pub fn create_disclosure<R>(predicate: &str, rng: &mut R) -> (DisclosureKey, DisclosureCommitment)
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut key = [0u8; KEY_LEN];
    rng.fill_bytes(&mut key);
    let mut nonce = [0u8; 32];
    rng.fill_bytes(&mut nonce);

    let commitment = prf::hash(&[predicate.as_bytes(), &nonce]);
    (
        DisclosureKey(key),
        DisclosureCommitment { commitment, nonce },
    )
}

/// Seal `secret` under `key`.
///
/// The pad is a keystream of exactly `secret.len()` bytes; secrets longer than the keystream
/// limit fail with [Error::SecretTooLong].
pub fn seal(secret: &[u8], key: &DisclosureKey) -> Result<DisclosurePackage> {
    let mut sealed_key = vec![0u8; secret.len()];
    prf::keystream(&key.0, PAD_INFO, &mut sealed_key)?;
    for (s, m) in sealed_key.iter_mut().zip(secret) {
        *s ^= m;
    }
    let auth_tag = prf::prf(&key.0, &[sealed_key.as_slice()]);
    Ok(DisclosurePackage {
        sealed_key,
        auth_tag,
    })
}

/// Verify and unseal `package`.
///
/// Fails with [Error::AuthenticationFailure] if the tag does not verify, and otherwise with
/// [Error::PermissionDenied] if `authorized` is false. No partial result is ever returned.
pub fn unseal(
    package: &DisclosurePackage,
    key: &DisclosureKey,
    authorized: bool,
) -> Result<Zeroizing<Vec<u8>>> {
    let expected = prf::prf(&key.0, &[package.sealed_key.as_slice()]);
    let tag_matches = expected.as_slice().ct_eq(package.auth_tag.as_slice());
    let permitted = Choice::from(u8::from(authorized));

    // No genuine package is longer than the keystream limit, so a failed expansion is a forgery.
    let mut secret = Zeroizing::new(vec![0u8; package.sealed_key.len()]);
    let expanded = prf::keystream(&key.0, PAD_INFO, &mut secret).is_ok();
    let authentic = tag_matches & Choice::from(u8::from(expanded));
    for (m, s) in secret.iter_mut().zip(&package.sealed_key) {
        *m ^= s;
    }

    match (bool::from(authentic), bool::from(permitted)) {
        (false, _) => Err(Error::AuthenticationFailure),
        (true, false) => Err(Error::PermissionDenied),
        (true, true) => Ok(secret),
    }
}
