use thiserror::Error;

/// Coarse classification of a failure.
///
/// Resolution problems (unknown algorithm, no key, bad size) are configuration
/// issues; `Integrity` means the data was forged or corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownAlgorithm,
    NoMatchingKey,
    InvalidKeySize,
    Format,
    Integrity,
    Disposed,
    Other,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("No matching key for algorithm {0}")]
    NoMatchingKey(String),

    #[error("Invalid key size for {algorithm}: {bits} bits")]
    InvalidKeySize { algorithm: String, bits: usize },

    #[error("Format error: {0}")]
    Format(String),

    // Deliberately carries no detail.
    #[error("Integrity check failed")]
    Integrity,

    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error("Algorithm {code} does not belong to the {expected} family")]
    FamilyMismatch { code: String, expected: &'static str },

    #[error("Key type {got} is not accepted by {algorithm}")]
    KeyTypeMismatch { algorithm: String, got: &'static str },

    #[error("Key has no private component")]
    MissingPrivateKey,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::UnknownAlgorithm(_) | CryptoError::FamilyMismatch { .. } => {
                ErrorKind::UnknownAlgorithm
            }
            CryptoError::NoMatchingKey(_)
            | CryptoError::KeyTypeMismatch { .. }
            | CryptoError::MissingPrivateKey => ErrorKind::NoMatchingKey,
            CryptoError::InvalidKeySize { .. } => ErrorKind::InvalidKeySize,
            CryptoError::Format(_) => ErrorKind::Format,
            CryptoError::Integrity => ErrorKind::Integrity,
            CryptoError::Disposed(_) => ErrorKind::Disposed,
            _ => ErrorKind::Other,
        }
    }
}

impl From<base64ct::Error> for CryptoError {
    fn from(e: base64ct::Error) -> Self {
        CryptoError::Format(format!("base64url: {}", e))
    }
}

pub(crate) fn rng_fill(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|e| CryptoError::RngFailed(e.to_string()))
}
