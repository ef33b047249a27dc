//! Authenticated encryption of response bodies.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit, Nonce, Tag},
    Aes128Gcm, Key,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::{Error, Result},
    submission::SubmissionKey,
};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Ciphertext of a response, stored with the nonce it was produced under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedResponse {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// An AEAD cipher keyed by a [SubmissionKey].
pub trait ResponseCipher: Send + Sync {
    /// Encrypt `plaintext` under a freshly drawn nonce.
    fn encrypt<R>(
        &self,
        key: &SubmissionKey,
        plaintext: &[u8],
        associated_data: &[u8],
        rng: &mut R,
    ) -> Result<EncryptedResponse>
    where
        R: RngCore + CryptoRng + ?Sized;

    /// Verify and decrypt `response`, failing closed with [Error::DecryptionFailure].
    fn decrypt(
        &self,
        key: &SubmissionKey,
        response: &EncryptedResponse,
        associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// AES-128-GCM with detached tags.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aes128GcmCipher;

impl ResponseCipher for Aes128GcmCipher {
    fn encrypt<R>(
        &self,
        key: &SubmissionKey,
        plaintext: &[u8],
        associated_data: &[u8],
        rng: &mut R,
    ) -> Result<EncryptedResponse>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_bytes()));
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let mut ciphertext = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(
                Nonce::<Aes128Gcm>::from_slice(&nonce),
                associated_data,
                &mut ciphertext,
            )
            .map_err(|_| Error::EncryptionFailure)?;

        Ok(EncryptedResponse {
            nonce,
            ciphertext,
            tag: tag.into(),
        })
    }

    fn decrypt(
        &self,
        key: &SubmissionKey,
        response: &EncryptedResponse,
        associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_bytes()));
        let mut plaintext = Zeroizing::new(response.ciphertext.clone());
        cipher
            .decrypt_in_place_detached(
                Nonce::<Aes128Gcm>::from_slice(&response.nonce),
                associated_data,
                &mut plaintext,
                Tag::<Aes128Gcm>::from_slice(&response.tag),
            )
            .map_err(|_| Error::DecryptionFailure)?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod test {
    use super::{Aes128GcmCipher, ResponseCipher};
    use crate::{error::Error, submission::SubmissionKey};

    #[test]
    fn encrypt_decrypt() {
        let key = SubmissionKey::from_bytes([3u8; 16]);
        let mut rng = rand::thread_rng();
        let sealed = Aes128GcmCipher
            .encrypt(&key, b"the canteen is too loud", b"ad", &mut rng)
            .unwrap();
        let opened = Aes128GcmCipher.decrypt(&key, &sealed, b"ad").unwrap();
        assert_eq!(opened.as_slice(), b"the canteen is too loud");
    }

    #[test]
    fn nonce_fresh_per_call() {
        let key = SubmissionKey::from_bytes([3u8; 16]);
        let mut rng = rand::thread_rng();
        let a = Aes128GcmCipher.encrypt(&key, b"same", b"", &mut rng).unwrap();
        let b = Aes128GcmCipher.encrypt(&key, b"same", b"", &mut rng).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampering_fails_closed() {
        let key = SubmissionKey::from_bytes([3u8; 16]);
        let mut rng = rand::thread_rng();
        let mut sealed = Aes128GcmCipher
            .encrypt(&key, b"payload", b"ad", &mut rng)
            .unwrap();
        sealed.ciphertext[0] ^= 1;
        let Err(Error::DecryptionFailure) = Aes128GcmCipher.decrypt(&key, &sealed, b"ad") else {
            panic!("tampered ciphertext decrypted");
        };
    }

    #[test]
    fn wrong_key_or_associated_data_fails() {
        let key = SubmissionKey::from_bytes([3u8; 16]);
        let mut rng = rand::thread_rng();
        let sealed = Aes128GcmCipher
            .encrypt(&key, b"payload", b"ad", &mut rng)
            .unwrap();
        let other = SubmissionKey::from_bytes([4u8; 16]);
        let Err(Error::DecryptionFailure) = Aes128GcmCipher.decrypt(&other, &sealed, b"ad") else {
            panic!("decrypted under the wrong key");
        };
        let Err(Error::DecryptionFailure) = Aes128GcmCipher.decrypt(&key, &sealed, b"other")
        else {
            panic!("decrypted under the wrong associated data");
        };
    }
}
