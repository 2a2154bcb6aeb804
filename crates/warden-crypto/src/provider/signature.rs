//! JWS signature providers: `none`, HMAC, RSA PKCS#1 v1.5 and PSS, ECDSA.

use std::sync::Arc;

use ecdsa::signature::{Signer, Verifier};
use p256::elliptic_curve::rand_core::OsRng;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use tracing::trace;

use super::mac::hmac;
use super::{validate_binding, CryptoFactory};
use crate::algorithm::{
    AlgorithmDescriptor, AlgorithmFamily, AlgorithmParams, HashAlg, SignatureKind,
};
use crate::error::CryptoError;
use crate::key::{EcKey, KeyMaterial, SecretKey};

#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureFactory;

impl CryptoFactory for SignatureFactory {
    type Provider = SignatureProvider;

    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::Signature
    }

    fn create_provider(
        &self,
        key: Arc<SecretKey>,
        descriptor: Arc<AlgorithmDescriptor>,
    ) -> Result<SignatureProvider, CryptoError> {
        validate_binding(self.family(), &key, &descriptor)?;
        let AlgorithmParams::Signature(kind) = descriptor.params() else {
            return Err(CryptoError::FamilyMismatch {
                code: descriptor.code().to_string(),
                expected: self.family().name(),
            });
        };
        let size = match kind {
            SignatureKind::None => 0,
            SignatureKind::Hmac(hash) => hash.output_len(),
            SignatureKind::RsaPkcs1(_) | SignatureKind::RsaPss(_) => key.key_size_bits()? / 8,
            SignatureKind::Ecdsa(curve) => 2 * curve.coordinate_len(),
        };
        Ok(SignatureProvider {
            key,
            descriptor,
            kind,
            size,
        })
    }
}

/// Signs and verifies with one key under one algorithm.
#[derive(Debug)]
pub struct SignatureProvider {
    key: Arc<SecretKey>,
    descriptor: Arc<AlgorithmDescriptor>,
    kind: SignatureKind,
    size: usize,
}

fn digest(hash: HashAlg, data: &[u8]) -> Vec<u8> {
    match hash {
        HashAlg::Sha256 => Sha256::digest(data).to_vec(),
        HashAlg::Sha384 => Sha384::digest(data).to_vec(),
        HashAlg::Sha512 => Sha512::digest(data).to_vec(),
    }
}

fn pkcs1_scheme(hash: HashAlg) -> Pkcs1v15Sign {
    match hash {
        HashAlg::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlg::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlg::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

// Salt length equals the hash length, as RFC 7518 requires.
fn pss_scheme(hash: HashAlg) -> Pss {
    match hash {
        HashAlg::Sha256 => Pss::new::<Sha256>(),
        HashAlg::Sha384 => Pss::new::<Sha384>(),
        HashAlg::Sha512 => Pss::new::<Sha512>(),
    }
}

fn rsa_private(material: &KeyMaterial) -> Result<&RsaPrivateKey, CryptoError> {
    match material.effective() {
        KeyMaterial::Rsa(rsa) => rsa.private().ok_or(CryptoError::MissingPrivateKey),
        other => Err(CryptoError::KeyTypeMismatch {
            algorithm: "RSA".to_string(),
            got: other.key_type().name(),
        }),
    }
}

fn rsa_public(material: &KeyMaterial) -> Option<&RsaPublicKey> {
    match material.effective() {
        KeyMaterial::Rsa(rsa) => Some(rsa.public()),
        _ => None,
    }
}

fn ecdsa_sign(ec: &EcKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match ec {
        EcKey::P256 {
            secret: Some(secret),
            ..
        } => {
            let signer = p256::ecdsa::SigningKey::from(secret);
            let signature: p256::ecdsa::Signature = signer
                .try_sign(data)
                .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
            Ok(signature.to_bytes().to_vec())
        }
        EcKey::P384 {
            secret: Some(secret),
            ..
        } => {
            let signer = p384::ecdsa::SigningKey::from(secret);
            let signature: p384::ecdsa::Signature = signer
                .try_sign(data)
                .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
            Ok(signature.to_bytes().to_vec())
        }
        _ => Err(CryptoError::MissingPrivateKey),
    }
}

fn ecdsa_verify(ec: &EcKey, data: &[u8], signature: &[u8]) -> bool {
    match ec {
        EcKey::P256 { public, .. } => {
            let (Ok(verifier), Ok(signature)) = (
                p256::ecdsa::VerifyingKey::from_affine(*public.as_affine()),
                p256::ecdsa::Signature::from_slice(signature),
            ) else {
                return false;
            };
            verifier.verify(data, &signature).is_ok()
        }
        EcKey::P384 { public, .. } => {
            let (Ok(verifier), Ok(signature)) = (
                p384::ecdsa::VerifyingKey::from_affine(*public.as_affine()),
                p384::ecdsa::Signature::from_slice(signature),
            ) else {
                return false;
            };
            verifier.verify(data, &signature).is_ok()
        }
    }
}

impl SignatureProvider {
    pub fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    /// The bound key.
    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    /// Exact length of every signature this provider produces.
    pub fn signature_size(&self) -> usize {
        self.size
    }

    /// Sign `data` into `destination`.
    ///
    /// Returns `Ok(None)` when `destination` is shorter than
    /// [`signature_size`](Self::signature_size); nothing is computed then.
    pub fn try_sign(
        &self,
        data: &[u8],
        destination: &mut [u8],
    ) -> Result<Option<usize>, CryptoError> {
        if destination.len() < self.size {
            return Ok(None);
        }
        let signature = self.sign(data)?;
        destination[..signature.len()].copy_from_slice(&signature);
        Ok(Some(signature.len()))
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let material = self.key.material()?;
        let signature = match self.kind {
            SignatureKind::None => Vec::new(),
            SignatureKind::Hmac(hash) => match material.effective() {
                KeyMaterial::Symmetric(bytes) => hmac(hash, bytes, &[data])?,
                other => {
                    return Err(CryptoError::KeyTypeMismatch {
                        algorithm: self.descriptor.code().to_string(),
                        got: other.key_type().name(),
                    })
                }
            },
            SignatureKind::RsaPkcs1(hash) => rsa_private(&material)?
                .sign(pkcs1_scheme(hash), &digest(hash, data))
                .map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
            SignatureKind::RsaPss(hash) => rsa_private(&material)?
                .sign_with_rng(&mut OsRng, pss_scheme(hash), &digest(hash, data))
                .map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
            SignatureKind::Ecdsa(_) => match material.effective() {
                KeyMaterial::Ecc(ec) => ecdsa_sign(ec, data)?,
                _ => return Err(CryptoError::MissingPrivateKey),
            },
        };
        trace!(alg = self.descriptor.code(), len = signature.len(), "signed");
        Ok(signature)
    }

    /// Check `signature` over `data`.
    ///
    /// A wrong signature is `Ok(false)`; errors are reserved for a disposed
    /// key.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let material = self.key.material()?;
        let valid = match self.kind {
            SignatureKind::None => signature.is_empty(),
            SignatureKind::Hmac(hash) => match material.effective() {
                KeyMaterial::Symmetric(bytes) => {
                    let expected = hmac(hash, bytes, &[data])?;
                    bool::from(expected.ct_eq(signature))
                }
                _ => false,
            },
            SignatureKind::RsaPkcs1(hash) => rsa_public(&material).is_some_and(|public| {
                public
                    .verify(pkcs1_scheme(hash), &digest(hash, data), signature)
                    .is_ok()
            }),
            SignatureKind::RsaPss(hash) => rsa_public(&material).is_some_and(|public| {
                public
                    .verify(pss_scheme(hash), &digest(hash, data), signature)
                    .is_ok()
            }),
            SignatureKind::Ecdsa(_) => match material.effective() {
                KeyMaterial::Ecc(ec) => ecdsa_verify(ec, data, signature),
                _ => false,
            },
        };
        Ok(valid)
    }
}
