//! Crypto factories and the providers they construct.
//!
//! One factory per algorithm family. A factory checks that a key and a
//! descriptor belong together and binds them into a provider; it performs no
//! cryptographic work. All cost is paid by the provider's operation calls.

mod aead;
mod compression;
mod kdf;
mod keywrap;
mod mac;
mod signature;

use std::sync::Arc;

use crate::algorithm::{AlgorithmDescriptor, AlgorithmFamily};
use crate::error::CryptoError;
use crate::key::SecretKey;

pub use aead::{AeadFactory, AeadOutput, AeadProvider};
pub use compression::{CompressionFactory, CompressionProvider, DEFAULT_MAX_DECOMPRESSED};
pub use kdf::concat_kdf;
pub use keywrap::{
    KeyWrapFactory, KeyWrapProvider, PartyInfo, WrapParameters, WrappedKey,
    DEFAULT_PBES2_ITERATIONS, DEFAULT_PBES2_MAX_ITERATIONS,
};
pub use signature::{SignatureFactory, SignatureProvider};

/// Builds providers for one algorithm family.
pub trait CryptoFactory {
    type Provider;

    fn family(&self) -> AlgorithmFamily;

    /// Bind `key` and `descriptor` into a provider.
    ///
    /// Fails if the descriptor belongs to another family, the key type is not
    /// accepted, the key is disposed, or its size is not legal.
    fn create_provider(
        &self,
        key: Arc<SecretKey>,
        descriptor: Arc<AlgorithmDescriptor>,
    ) -> Result<Self::Provider, CryptoError>;
}

/// Checks shared by every factory before a provider is built.
pub(crate) fn validate_binding(
    family: AlgorithmFamily,
    key: &SecretKey,
    descriptor: &AlgorithmDescriptor,
) -> Result<(), CryptoError> {
    if descriptor.family() != family {
        return Err(CryptoError::FamilyMismatch {
            code: descriptor.code().to_string(),
            expected: family.name(),
        });
    }
    let key_type = key.effective_key_type()?;
    if !descriptor.accepts_key_type(key_type) {
        return Err(CryptoError::KeyTypeMismatch {
            algorithm: descriptor.code().to_string(),
            got: key_type.name(),
        });
    }
    let bits = key.key_size_bits()?;
    if !descriptor.is_legal_key_size(bits) {
        return Err(CryptoError::InvalidKeySize {
            algorithm: descriptor.code().to_string(),
            bits,
        });
    }
    Ok(())
}
