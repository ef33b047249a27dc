//! Hash, keyed PRF and keystream primitives used throughout the protocol.
//!
//! `hash` is BLAKE2s-256 over the plain concatenation of its inputs. `prf` is keyed BLAKE2s-256
//! in MAC mode. `keystream` is HKDF-Expand over BLAKE2s-256, used to stretch a key into a pad of
//! any exact length.

use blake2::{Blake2s256, Blake2sMac256, Digest};
use digest::{KeyInit, Mac};
use hkdf::SimpleHkdf;

use crate::error::{Error, Result};

/// Output length of both [hash] and [prf].
pub const OUTPUT_LEN: usize = 32;

/// Length of every PRF key in this crate.
pub const KEY_LEN: usize = 32;

const KEYSTREAM_SALT: &[u8] = b"anonize::prf::keystream::salt";

/// Hash the concatenation `parts[0] ‖ parts[1] ‖ ...`.
pub fn hash(parts: &[&[u8]]) -> [u8; OUTPUT_LEN] {
    let mut hasher = Blake2s256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Keyed pseudorandom function over the concatenation of `parts`.
pub fn prf(key: &[u8; KEY_LEN], parts: &[&[u8]]) -> [u8; OUTPUT_LEN] {
    let mut mac =
        <Blake2sMac256 as KeyInit>::new(digest::Key::<Blake2sMac256>::from_slice(key));
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Fill `out` with a pad derived from `key`, bound to the given `info` label.
///
/// The pad is exactly `out.len()` bytes. Requests beyond the HKDF output limit are rejected, never
/// truncated.
pub fn keystream(key: &[u8; KEY_LEN], info: &[u8], out: &mut [u8]) -> Result<()> {
    SimpleHkdf::<Blake2s256>::new(Some(KEYSTREAM_SALT), key)
        .expand(info, out)
        .map_err(|_| Error::SecretTooLong(out.len()))
}

#[cfg(test)]
mod test {
    use super::{hash, keystream, prf};
    use crate::error::Error;

    #[test]
    fn hash_is_concatenation() {
        assert_eq!(hash(&[b"ab", b"cd"]), hash(&[b"abcd"]));
        assert_ne!(hash(&[b"ab"]), hash(&[b"abcd"]));
    }

    #[test]
    fn prf_depends_on_key() {
        let a = prf(&[1u8; 32], &[b"alice"]);
        let b = prf(&[2u8; 32], &[b"alice"]);
        assert_ne!(a, b);
        assert_eq!(a, prf(&[1u8; 32], &[b"ali", b"ce"]));
    }

    #[test]
    fn keystream_exact_length() {
        let mut short = [0u8; 16];
        let mut long = [0u8; 100];
        keystream(&[7u8; 32], b"pad", &mut short).unwrap();
        keystream(&[7u8; 32], b"pad", &mut long).unwrap();
        // HKDF-Expand output is prefix-consistent across lengths.
        assert_eq!(short, long[..16]);
        assert_ne!(short, [0u8; 16]);
    }

    #[test]
    fn keystream_rejects_oversized_request() {
        let mut huge = vec![0u8; 255 * 32 + 1];
        let Err(Error::SecretTooLong(len)) = keystream(&[7u8; 32], b"pad", &mut huge) else {
            panic!("oversized keystream request was not rejected");
        };
        assert_eq!(len, huge.len());
    }
}
