use p256::elliptic_curve::rand_core::OsRng;
use rsa::RsaPrivateKey;
use tracing::debug;
use zeroize::Zeroizing;

use super::material::{EcKey, KeyMaterial, RsaKey};
use super::{KeyMetadata, KeyUsage, SecretKey};
use crate::algorithm::{AlgorithmDescriptor, AlgorithmFamily, EcCurve, KeyType};
use crate::error::{rng_fill, CryptoError};

impl SecretKey {
    /// Generate a fresh key suitable for `descriptor`.
    ///
    /// `bits_hint` of `None` selects the descriptor's default size. An explicit
    /// hint must be legal for the descriptor; it is checked before any key
    /// material is produced.
    pub fn generate(
        key_id: Option<String>,
        descriptor: &AlgorithmDescriptor,
        bits_hint: Option<usize>,
    ) -> Result<Self, CryptoError> {
        let bits = match bits_hint {
            None => descriptor.default_key_size(),
            Some(bits) if descriptor.is_legal_key_size(bits) => bits,
            Some(bits) => {
                return Err(CryptoError::InvalidKeySize {
                    algorithm: descriptor.code().to_string(),
                    bits,
                })
            }
        };
        let invalid = || CryptoError::InvalidKeySize {
            algorithm: descriptor.code().to_string(),
            bits,
        };

        let material = match descriptor.key_type() {
            KeyType::None => KeyMaterial::None,
            KeyType::Symmetric => {
                if bits == 0 || bits % 8 != 0 {
                    return Err(invalid());
                }
                let mut bytes = Zeroizing::new(vec![0u8; bits / 8]);
                rng_fill(&mut bytes)?;
                KeyMaterial::Symmetric(bytes)
            }
            KeyType::Rsa => {
                let private = RsaPrivateKey::new(&mut OsRng, bits)
                    .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
                KeyMaterial::Rsa(RsaKey::from_private(private))
            }
            KeyType::Ecc => match EcCurve::from_bits(bits).ok_or_else(invalid)? {
                EcCurve::P256 => {
                    KeyMaterial::Ecc(EcKey::from_p256(p256::SecretKey::random(&mut OsRng)))
                }
                EcCurve::P384 => {
                    KeyMaterial::Ecc(EcKey::from_p384(p384::SecretKey::random(&mut OsRng)))
                }
            },
            KeyType::Certificate => {
                return Err(CryptoError::Unsupported(
                    "certificates cannot be generated".to_string(),
                ))
            }
        };

        let usage = match descriptor.family() {
            AlgorithmFamily::Signature => Some(KeyUsage::Signing),
            AlgorithmFamily::AuthenticatedEncryption | AlgorithmFamily::KeyManagement => {
                Some(KeyUsage::Encryption)
            }
            AlgorithmFamily::Compression => None,
        };
        debug!(alg = descriptor.code(), bits, "generated key");
        Ok(SecretKey::new(
            key_id,
            material,
            KeyMetadata {
                algorithm: Some(descriptor.code().to_string()),
                usage,
                ..KeyMetadata::default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmRegistry;

    fn descriptor(family: AlgorithmFamily, code: &str) -> std::sync::Arc<AlgorithmDescriptor> {
        AlgorithmRegistry::builtin().find(family, code).unwrap()
    }

    #[test]
    fn default_size_when_no_hint() {
        let d = descriptor(AlgorithmFamily::AuthenticatedEncryption, "A256GCM");
        let key = SecretKey::generate(None, &d, None).unwrap();
        assert_eq!(key.key_size_bits().unwrap(), 256);
        assert_eq!(key.metadata().unwrap().algorithm.as_deref(), Some("A256GCM"));
        assert_eq!(key.metadata().unwrap().usage, Some(KeyUsage::Encryption));
    }

    #[test]
    fn legal_hint_is_honoured() {
        let d = descriptor(AlgorithmFamily::Signature, "HS256");
        let key = SecretKey::generate(Some("h".to_string()), &d, Some(512)).unwrap();
        assert_eq!(key.key_size_bits().unwrap(), 512);
        assert_eq!(key.metadata().unwrap().usage, Some(KeyUsage::Signing));
    }

    #[test]
    fn illegal_hint_is_rejected() {
        let d = descriptor(AlgorithmFamily::AuthenticatedEncryption, "A128GCM");
        let err = SecretKey::generate(None, &d, Some(192)).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeySize { bits: 192, .. }));

        // Rejected before RSA generation would start.
        let d = descriptor(AlgorithmFamily::Signature, "RS256");
        assert!(SecretKey::generate(None, &d, Some(1024)).is_err());
    }

    #[test]
    fn ec_curve_follows_size() {
        let d = descriptor(AlgorithmFamily::KeyManagement, "ECDH-ES");
        let key = SecretKey::generate(None, &d, Some(384)).unwrap();
        assert_eq!(key.key_type().unwrap(), KeyType::Ecc);
        assert_eq!(key.key_size_bits().unwrap(), 384);
    }

    #[test]
    fn generated_symmetric_keys_differ() {
        let d = descriptor(AlgorithmFamily::KeyManagement, "A128KW");
        let a = SecretKey::generate(None, &d, None).unwrap();
        let b = SecretKey::generate(None, &d, None).unwrap();
        assert_ne!(
            a.export_parameters(true).unwrap().k,
            b.export_parameters(true).unwrap().k
        );
    }
}
