//! Raw key material behind a [`SecretKey`](super::SecretKey).
//!
//! Every private component here wipes itself on drop: symmetric bytes via
//! `Zeroizing`, RSA and EC private keys via their own `ZeroizeOnDrop`.

use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::algorithm::{EcCurve, KeyType};
use crate::error::CryptoError;

/// RSA public key with optional private half.
pub struct RsaKey {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl RsaKey {
    pub fn from_private(private: RsaPrivateKey) -> Self {
        Self {
            public: private.to_public_key(),
            private: Some(private),
        }
    }

    pub fn from_public(public: RsaPublicKey) -> Self {
        Self {
            public,
            private: None,
        }
    }

    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private(&self) -> Option<&RsaPrivateKey> {
        self.private.as_ref()
    }

    pub fn size_bits(&self) -> usize {
        self.public.size() * 8
    }
}

/// EC public key with optional private scalar.
pub enum EcKey {
    P256 {
        public: p256::PublicKey,
        secret: Option<p256::SecretKey>,
    },
    P384 {
        public: p384::PublicKey,
        secret: Option<p384::SecretKey>,
    },
}

impl EcKey {
    pub fn from_p256(secret: p256::SecretKey) -> Self {
        EcKey::P256 {
            public: secret.public_key(),
            secret: Some(secret),
        }
    }

    pub fn from_p384(secret: p384::SecretKey) -> Self {
        EcKey::P384 {
            public: secret.public_key(),
            secret: Some(secret),
        }
    }

    pub fn curve(&self) -> EcCurve {
        match self {
            EcKey::P256 { .. } => EcCurve::P256,
            EcKey::P384 { .. } => EcCurve::P384,
        }
    }

    pub fn has_private(&self) -> bool {
        match self {
            EcKey::P256 { secret, .. } => secret.is_some(),
            EcKey::P384 { secret, .. } => secret.is_some(),
        }
    }

    /// Affine `(x, y)`, each exactly one coordinate length long.
    pub fn coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        let uncompressed = match self {
            EcKey::P256 { public, .. } => public.to_encoded_point(false).as_bytes().to_vec(),
            EcKey::P384 { public, .. } => public.to_encoded_point(false).as_bytes().to_vec(),
        };
        // SEC1 uncompressed: 0x04 || x || y
        let n = self.curve().coordinate_len();
        (uncompressed[1..1 + n].to_vec(), uncompressed[1 + n..].to_vec())
    }

    /// Big-endian private scalar, if present.
    pub fn private_scalar(&self) -> Option<Zeroizing<Vec<u8>>> {
        match self {
            EcKey::P256 { secret, .. } => secret
                .as_ref()
                .map(|s| Zeroizing::new(s.to_bytes().to_vec())),
            EcKey::P384 { secret, .. } => secret
                .as_ref()
                .map(|s| Zeroizing::new(s.to_bytes().to_vec())),
        }
    }

    /// Public key from affine coordinates.
    ///
    /// Coordinates shorter than the curve size are left-padded, since JWKs
    /// may omit leading zeros.
    pub fn from_coordinates(curve: EcCurve, x: &[u8], y: &[u8]) -> Result<Self, CryptoError> {
        let n = curve.coordinate_len();
        if x.len() > n || y.len() > n {
            return Err(CryptoError::InvalidKey(format!(
                "{} coordinate longer than {} bytes",
                curve.jwk_name(),
                n
            )));
        }
        let mut uncompressed = Vec::with_capacity(1 + 2 * n);
        uncompressed.push(0x04);
        uncompressed.extend(std::iter::repeat(0u8).take(n - x.len()));
        uncompressed.extend_from_slice(x);
        uncompressed.extend(std::iter::repeat(0u8).take(n - y.len()));
        uncompressed.extend_from_slice(y);

        match curve {
            EcCurve::P256 => p256::PublicKey::from_sec1_bytes(&uncompressed)
                .map(|public| EcKey::P256 {
                    public,
                    secret: None,
                })
                .map_err(|e| CryptoError::InvalidKey(format!("P-256 point: {}", e))),
            EcCurve::P384 => p384::PublicKey::from_sec1_bytes(&uncompressed)
                .map(|public| EcKey::P384 {
                    public,
                    secret: None,
                })
                .map_err(|e| CryptoError::InvalidKey(format!("P-384 point: {}", e))),
        }
    }

    /// Private key from its scalar; the public half is derived.
    pub fn from_scalar(curve: EcCurve, d: &[u8]) -> Result<Self, CryptoError> {
        match curve {
            EcCurve::P256 => p256::SecretKey::from_slice(d)
                .map(EcKey::from_p256)
                .map_err(|e| CryptoError::InvalidKey(format!("P-256 scalar: {}", e))),
            EcCurve::P384 => p384::SecretKey::from_slice(d)
                .map(EcKey::from_p384)
                .map_err(|e| CryptoError::InvalidKey(format!("P-384 scalar: {}", e))),
        }
    }
}

/// DER certificate wrapping an RSA or EC key.
///
/// The certificate is carried, not validated.
pub struct CertificateKey {
    der: Vec<u8>,
    thumbprint: [u8; 32],
    inner: Box<KeyMaterial>,
}

impl CertificateKey {
    pub fn new(der: Vec<u8>, inner: KeyMaterial) -> Result<Self, CryptoError> {
        if !matches!(inner, KeyMaterial::Rsa(_) | KeyMaterial::Ecc(_)) {
            return Err(CryptoError::InvalidKey(
                "certificate must wrap an RSA or EC key".to_string(),
            ));
        }
        let thumbprint = Sha256::digest(&der).into();
        Ok(Self {
            der,
            thumbprint,
            inner: Box::new(inner),
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 of the DER encoding (`x5t#S256`).
    pub fn thumbprint(&self) -> &[u8; 32] {
        &self.thumbprint
    }

    pub fn inner(&self) -> &KeyMaterial {
        &self.inner
    }
}

pub enum KeyMaterial {
    None,
    Symmetric(Zeroizing<Vec<u8>>),
    Rsa(RsaKey),
    Ecc(EcKey),
    Certificate(CertificateKey),
}

impl KeyMaterial {
    pub fn symmetric(bytes: &[u8]) -> Self {
        KeyMaterial::Symmetric(Zeroizing::new(bytes.to_vec()))
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            KeyMaterial::None => KeyType::None,
            KeyMaterial::Symmetric(_) => KeyType::Symmetric,
            KeyMaterial::Rsa(_) => KeyType::Rsa,
            KeyMaterial::Ecc(_) => KeyType::Ecc,
            KeyMaterial::Certificate(_) => KeyType::Certificate,
        }
    }

    /// The material providers operate on; certificates resolve to their key.
    pub fn effective(&self) -> &KeyMaterial {
        match self {
            KeyMaterial::Certificate(cert) => cert.inner(),
            other => other,
        }
    }

    pub fn size_bits(&self) -> usize {
        match self.effective() {
            KeyMaterial::None | KeyMaterial::Certificate(_) => 0,
            KeyMaterial::Symmetric(bytes) => bytes.len() * 8,
            KeyMaterial::Rsa(rsa) => rsa.size_bits(),
            KeyMaterial::Ecc(ec) => ec.curve().bits(),
        }
    }

    pub fn has_private(&self) -> bool {
        match self.effective() {
            KeyMaterial::None | KeyMaterial::Certificate(_) => false,
            KeyMaterial::Symmetric(_) => true,
            KeyMaterial::Rsa(rsa) => rsa.private().is_some(),
            KeyMaterial::Ecc(ec) => ec.has_private(),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("type", &self.key_type().name())
            .field("bits", &self.size_bits())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_size_in_bits() {
        let material = KeyMaterial::symmetric(&[7u8; 32]);
        assert_eq!(material.size_bits(), 256);
        assert_eq!(material.key_type(), KeyType::Symmetric);
        assert!(material.has_private());
    }

    #[test]
    fn ec_coordinates_round_trip() {
        let secret = p256::SecretKey::random(&mut p256::elliptic_curve::rand_core::OsRng);
        let key = EcKey::from_p256(secret);
        let (x, y) = key.coordinates();
        assert_eq!(x.len(), 32);
        assert_eq!(y.len(), 32);

        let public = EcKey::from_coordinates(EcCurve::P256, &x, &y).unwrap();
        assert!(!public.has_private());
        assert_eq!(public.coordinates(), (x, y));
    }

    #[test]
    fn ec_coordinates_reject_off_curve_points() {
        assert!(EcKey::from_coordinates(EcCurve::P256, &[1u8; 32], &[2u8; 32]).is_err());
        assert!(EcKey::from_coordinates(EcCurve::P256, &[1u8; 33], &[2u8; 32]).is_err());
    }

    #[test]
    fn certificate_reports_inner_size() {
        let ec = EcKey::from_p384(p384::SecretKey::random(
            &mut p256::elliptic_curve::rand_core::OsRng,
        ));
        let cert = CertificateKey::new(vec![0x30, 0x00], KeyMaterial::Ecc(ec)).unwrap();
        let material = KeyMaterial::Certificate(cert);
        assert_eq!(material.key_type(), KeyType::Certificate);
        assert_eq!(material.effective().key_type(), KeyType::Ecc);
        assert_eq!(material.size_bits(), 384);
    }

    #[test]
    fn certificate_rejects_symmetric_inner() {
        assert!(CertificateKey::new(vec![], KeyMaterial::symmetric(&[0u8; 16])).is_err());
    }

    #[test]
    fn debug_output_hides_key_bytes() {
        let material = KeyMaterial::symmetric(b"super-secret-bytes-here");
        let printed = format!("{:?}", material);
        assert!(!printed.contains("super"));
        assert!(printed.contains("symmetric"));
    }
}
