//! Error taxonomy shared by every stage of the submission protocol.

/// Errors returned by registration, preparation and disclosure.
///
/// Every cryptographic check fails closed: a variant is returned in place of any partial
/// result, never alongside one.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("participant identity must not be empty")]
    EmptyIdentity,
    #[error("pseudonym is not registered with the collector")]
    UnregisteredPseudonym,
    #[error("credential possession proof rejected")]
    ProofRejected,
    #[error("submission index {index} out of range for {len} stored submissions")]
    InvalidIndex { index: usize, len: usize },
    /// The disclosure package tag did not verify. The package is unusable.
    #[error("disclosure package failed authentication")]
    AuthenticationFailure,
    /// The package is authentic but disclosure was not authorized.
    #[error("disclosure not authorized")]
    PermissionDenied,
    #[error("response encryption failed")]
    EncryptionFailure,
    /// The response ciphertext failed AEAD verification.
    #[error("response decryption failed")]
    DecryptionFailure,
    #[error("secret of {0} bytes exceeds the keystream limit")]
    SecretTooLong(usize),
    /// Submissions are released by tasks on the caller's Tokio runtime.
    #[error("no Tokio runtime available to schedule releases")]
    NoRuntime,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl Error {
    /// Whether repeating the same request can succeed without any change of inputs.
    ///
    /// `PermissionDenied` is not: it only clears once authorization is
    /// actually granted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::AuthenticationFailure | Error::DecryptionFailure)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
