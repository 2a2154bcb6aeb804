//! Secret keys with explicit disposal.
//!
//! A [`SecretKey`] owns its material behind a read-write lock. Providers hold a
//! read borrow for the duration of one operation; [`SecretKey::dispose`] takes
//! the write lock, so it waits for in-flight operations and then drops the
//! material, which zeroizes every secret component.

mod generate;
mod jwk;
mod material;
mod record;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::{AlgorithmFamily, KeyType};
use crate::error::CryptoError;
use crate::source::{Collection, Disposable};

pub use jwk::Jwk;
pub use material::{CertificateKey, EcKey, KeyMaterial, RsaKey};
pub use record::{deserialize_record, serialize_record, ImportedSecret, SecretRecord};

pub type SecretKeyCollection = Collection<SecretKey>;

/// Intended use of a key, mirroring the JWK `use` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUsage {
    #[serde(rename = "sig")]
    Signing,
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUsage {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyUsage::Signing => "sig",
            KeyUsage::Encryption => "enc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sig" => Some(KeyUsage::Signing),
            "enc" => Some(KeyUsage::Encryption),
            _ => None,
        }
    }

    /// Whether a key with this usage may serve `family`.
    pub fn permits(self, family: AlgorithmFamily) -> bool {
        match self {
            KeyUsage::Signing => family == AlgorithmFamily::Signature,
            KeyUsage::Encryption => matches!(
                family,
                AlgorithmFamily::AuthenticatedEncryption | AlgorithmFamily::KeyManagement
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMetadata {
    /// Algorithm hint (`alg`).
    pub algorithm: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage: Option<KeyUsage>,
}

impl KeyMetadata {
    pub fn with_algorithm(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: Some(algorithm.into()),
            ..Self::default()
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |nbf| now >= nbf)
            && self.expires_at.map_or(true, |exp| now < exp)
    }
}

pub struct SecretKey {
    key_id: Option<String>,
    metadata: KeyMetadata,
    key_type: KeyType,
    effective_key_type: KeyType,
    size_bits: usize,
    disposed: AtomicBool,
    material: RwLock<Option<KeyMaterial>>,
}

impl SecretKey {
    pub fn new(key_id: Option<String>, material: KeyMaterial, metadata: KeyMetadata) -> Self {
        Self {
            key_id,
            metadata,
            key_type: material.key_type(),
            effective_key_type: material.effective().key_type(),
            size_bits: material.size_bits(),
            disposed: AtomicBool::new(false),
            material: RwLock::new(Some(material)),
        }
    }

    /// Symmetric key over a copy of `bytes`.
    pub fn symmetric(key_id: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(
            Some(key_id.into()),
            KeyMaterial::symmetric(bytes),
            KeyMetadata::default(),
        )
    }

    /// The key used by algorithms that take no key (`none`).
    pub fn none() -> Self {
        Self::new(None, KeyMaterial::None, KeyMetadata::default())
    }

    pub fn with_metadata(mut self, metadata: KeyMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// RSA or EC private key from a PKCS#8 PEM document.
    pub fn from_pkcs8_pem(key_id: Option<String>, pem: &str) -> Result<Self, CryptoError> {
        use rsa::pkcs8::DecodePrivateKey;

        if let Ok(private) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::new(
                key_id,
                KeyMaterial::Rsa(RsaKey::from_private(private)),
                KeyMetadata::default(),
            ));
        }
        if let Ok(secret) = p256::SecretKey::from_pkcs8_pem(pem) {
            return Ok(Self::new(
                key_id,
                KeyMaterial::Ecc(EcKey::from_p256(secret)),
                KeyMetadata::default(),
            ));
        }
        if let Ok(secret) = p384::SecretKey::from_pkcs8_pem(pem) {
            return Ok(Self::new(
                key_id,
                KeyMaterial::Ecc(EcKey::from_p384(secret)),
                KeyMetadata::default(),
            ));
        }
        Err(CryptoError::InvalidKey(
            "PEM is not an RSA, P-256 or P-384 PKCS#8 private key".to_string(),
        ))
    }

    /// RSA or EC private key from PKCS#8 DER.
    pub fn from_pkcs8_der(key_id: Option<String>, der: &[u8]) -> Result<Self, CryptoError> {
        use rsa::pkcs8::DecodePrivateKey;

        let material = if let Ok(private) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
            KeyMaterial::Rsa(RsaKey::from_private(private))
        } else if let Ok(secret) = p256::SecretKey::from_pkcs8_der(der) {
            KeyMaterial::Ecc(EcKey::from_p256(secret))
        } else if let Ok(secret) = p384::SecretKey::from_pkcs8_der(der) {
            KeyMaterial::Ecc(EcKey::from_p384(secret))
        } else {
            return Err(CryptoError::InvalidKey(
                "DER is not an RSA, P-256 or P-384 PKCS#8 private key".to_string(),
            ));
        };
        Ok(Self::new(key_id, material, KeyMetadata::default()))
    }

    fn ensure_live(&self) -> Result<(), CryptoError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(CryptoError::Disposed("secret key"))
        } else {
            Ok(())
        }
    }

    pub fn key_id(&self) -> Result<Option<&str>, CryptoError> {
        self.ensure_live()?;
        Ok(self.key_id.as_deref())
    }

    pub fn metadata(&self) -> Result<&KeyMetadata, CryptoError> {
        self.ensure_live()?;
        Ok(&self.metadata)
    }

    pub fn key_type(&self) -> Result<KeyType, CryptoError> {
        self.ensure_live()?;
        Ok(self.key_type)
    }

    /// Type used for algorithm matching; certificates report their inner key.
    pub fn effective_key_type(&self) -> Result<KeyType, CryptoError> {
        self.ensure_live()?;
        Ok(self.effective_key_type)
    }

    pub fn key_size_bits(&self) -> Result<usize, CryptoError> {
        self.ensure_live()?;
        Ok(self.size_bits)
    }

    pub fn has_private(&self) -> Result<bool, CryptoError> {
        Ok(self.material()?.has_private())
    }

    /// Borrow the material for one operation.
    ///
    /// The guard blocks [`dispose`](Self::dispose) until it is dropped.
    pub(crate) fn material(&self) -> Result<MappedRwLockReadGuard<'_, KeyMaterial>, CryptoError> {
        let guard = self.material.read();
        RwLockReadGuard::try_map(guard, |m| m.as_ref())
            .map_err(|_| CryptoError::Disposed("secret key"))
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Drop the key material. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let material = self.material.write().take();
        drop(material);
        debug!(kid = self.key_id.as_deref(), "secret key disposed");
    }
}

impl Disposable for SecretKey {
    fn dispose(&self) {
        SecretKey::dispose(self);
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("key_id", &self.key_id)
            .field("key_type", &self.key_type.name())
            .field("size_bits", &self.size_bits)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn accessors_fail_after_dispose() {
        let key = SecretKey::symmetric("k1", &[1u8; 32]);
        assert_eq!(key.key_id().unwrap(), Some("k1"));
        assert_eq!(key.key_size_bits().unwrap(), 256);

        key.dispose();
        assert!(key.is_disposed());
        for err in [
            key.key_id().err(),
            key.key_type().err(),
            key.key_size_bits().err(),
            key.has_private().err(),
            key.material().err(),
        ] {
            assert!(matches!(err, Some(CryptoError::Disposed(_))));
        }
    }

    #[test]
    fn dispose_is_idempotent() {
        let key = SecretKey::symmetric("k1", &[1u8; 16]);
        key.dispose();
        key.dispose();
        assert!(key.is_disposed());
    }

    #[test]
    fn dispose_waits_for_material_borrow() {
        let key = Arc::new(SecretKey::symmetric("k1", &[9u8; 32]));
        let guard = key.material().unwrap();

        let disposer = {
            let key = key.clone();
            std::thread::spawn(move || key.dispose())
        };
        // The borrowed material stays intact while the disposer blocks.
        std::thread::sleep(std::time::Duration::from_millis(20));
        match &*guard {
            KeyMaterial::Symmetric(bytes) => assert_eq!(bytes.as_slice(), &[9u8; 32]),
            other => panic!("unexpected material: {:?}", other),
        }
        drop(guard);
        disposer.join().unwrap();
        assert!(key.material().is_err());
    }

    #[test]
    fn owning_collection_disposes_keys() {
        let key = Arc::new(SecretKey::symmetric("k1", &[0u8; 32]));
        let collection = SecretKeyCollection::from_items(vec![key.clone()], true);
        collection.dispose();
        assert!(key.is_disposed());
        assert!(collection.snapshot().is_err());
    }

    #[test]
    fn non_owning_collection_leaves_keys_alive() {
        let key = Arc::new(SecretKey::symmetric("k1", &[0u8; 32]));
        let collection = SecretKeyCollection::from_items(vec![key.clone()], false);
        collection.dispose();
        assert!(!key.is_disposed());
    }

    #[test]
    fn validity_window() {
        let now = Utc::now();
        let metadata = KeyMetadata {
            not_before: Some(now - Duration::hours(1)),
            expires_at: Some(now + Duration::hours(1)),
            ..KeyMetadata::default()
        };
        assert!(metadata.is_valid_at(now));
        assert!(!metadata.is_valid_at(now + Duration::hours(2)));
        assert!(!metadata.is_valid_at(now - Duration::hours(2)));
    }

    #[test]
    fn usage_permits_families() {
        assert!(KeyUsage::Signing.permits(AlgorithmFamily::Signature));
        assert!(!KeyUsage::Signing.permits(AlgorithmFamily::KeyManagement));
        assert!(KeyUsage::Encryption.permits(AlgorithmFamily::AuthenticatedEncryption));
        assert!(KeyUsage::Encryption.permits(AlgorithmFamily::KeyManagement));
    }

    #[test]
    fn loads_rsa_pkcs8_pem() {
        let key = SecretKey::from_pkcs8_pem(
            Some("rsa".to_string()),
            include_str!("../../testdata/rsa2048.pem"),
        )
        .unwrap();
        assert_eq!(key.key_type().unwrap(), KeyType::Rsa);
        assert_eq!(key.key_size_bits().unwrap(), 2048);
        assert!(key.has_private().unwrap());
    }

    #[test]
    fn debug_hides_material() {
        let key = SecretKey::symmetric("k1", b"0123456789abcdef");
        let printed = format!("{:?}", key);
        assert!(printed.contains("k1"));
        assert!(!printed.contains("0123456789"));
    }
}
