//! JSON Web Key import and export.

use std::fmt;

use base64ct::{Base64, Encoding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use super::material::{CertificateKey, EcKey, KeyMaterial, RsaKey};
use super::{KeyMetadata, KeyUsage, SecretKey};
use crate::algorithm::EcCurve;
use crate::base64url::{base64url_decode, base64url_encode};
use crate::error::CryptoError;

/// A JWK (RFC 7517). Private members are wiped on drop.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
    #[serde(rename = "x5t#S256", skip_serializing_if = "Option::is_none")]
    pub x5t_s256: Option<String>,
}

impl Jwk {
    pub fn is_private(&self) -> bool {
        self.k.is_some() || self.d.is_some()
    }

    /// Copy with every private member removed.
    pub fn to_public(&self) -> Self {
        let mut public = self.clone();
        public.k = None;
        public.d = None;
        public.p = None;
        public.q = None;
        public
    }

    /// RFC 7638 thumbprint: base64url SHA-256 over the required members in
    /// lexicographic order.
    pub fn thumbprint(&self) -> Result<String, CryptoError> {
        let input = match self.kty.as_str() {
            "EC" => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                required(&self.crv, "crv")?,
                required(&self.x, "x")?,
                required(&self.y, "y")?
            ),
            "RSA" => format!(
                r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
                required(&self.e, "e")?,
                required(&self.n, "n")?
            ),
            "oct" => format!(r#"{{"k":"{}","kty":"oct"}}"#, required(&self.k, "k")?),
            other => return Err(CryptoError::Unsupported(format!("JWK key type {}", other))),
        };
        let input = Zeroizing::new(input);
        Ok(base64url_encode(&Sha256::digest(input.as_bytes())))
    }
}

impl Drop for Jwk {
    fn drop(&mut self) {
        for secret in [&mut self.k, &mut self.d, &mut self.p, &mut self.q] {
            if let Some(value) = secret.as_mut() {
                value.zeroize();
            }
        }
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("crv", &self.crv)
            .field("private", &self.is_private())
            .finish_non_exhaustive()
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, CryptoError> {
    value
        .as_deref()
        .ok_or_else(|| CryptoError::InvalidKey(format!("JWK is missing {}", name)))
}

fn decode_member(value: &Option<String>, name: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    base64url_decode(required(value, name)?)
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::InvalidKey(format!("JWK member {}: {}", name, e)))
}

fn decode_uint(value: &Option<String>, name: &str) -> Result<BigUint, CryptoError> {
    Ok(BigUint::from_bytes_be(&decode_member(value, name)?))
}

fn rsa_from_jwk(jwk: &Jwk) -> Result<RsaKey, CryptoError> {
    let n = decode_uint(&jwk.n, "n")?;
    let e = decode_uint(&jwk.e, "e")?;
    if jwk.d.is_none() {
        let public = RsaPublicKey::new(n, e)
            .map_err(|e| CryptoError::InvalidKey(format!("RSA public key: {}", e)))?;
        return Ok(RsaKey::from_public(public));
    }

    let d = decode_uint(&jwk.d, "d")?;
    let p = decode_uint(&jwk.p, "p")?;
    let q = decode_uint(&jwk.q, "q")?;
    let private = RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| CryptoError::InvalidKey(format!("RSA private key: {}", e)))?;
    private
        .validate()
        .map_err(|e| CryptoError::InvalidKey(format!("RSA private key: {}", e)))?;
    Ok(RsaKey::from_private(private))
}

fn ec_from_jwk(jwk: &Jwk) -> Result<EcKey, CryptoError> {
    let crv = required(&jwk.crv, "crv")?;
    let curve = EcCurve::from_jwk_name(crv)
        .ok_or_else(|| CryptoError::Unsupported(format!("curve {}", crv)))?;
    let x = decode_member(&jwk.x, "x")?;
    let y = decode_member(&jwk.y, "y")?;
    let public = EcKey::from_coordinates(curve, &x, &y)?;
    if jwk.d.is_none() {
        return Ok(public);
    }

    let d = decode_member(&jwk.d, "d")?;
    let private = EcKey::from_scalar(curve, &d)?;
    if private.coordinates() != public.coordinates() {
        return Err(CryptoError::InvalidKey(
            "EC private scalar does not match x/y".to_string(),
        ));
    }
    Ok(private)
}

impl SecretKey {
    /// Import a key from its JWK form.
    ///
    /// `x5c` wraps the RSA or EC key as a certificate-backed key; the chain is
    /// not validated.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, CryptoError> {
        let material = match jwk.kty.as_str() {
            "oct" => KeyMaterial::Symmetric(decode_member(&jwk.k, "k")?),
            "RSA" => KeyMaterial::Rsa(rsa_from_jwk(jwk)?),
            "EC" => KeyMaterial::Ecc(ec_from_jwk(jwk)?),
            other => return Err(CryptoError::Unsupported(format!("JWK key type {}", other))),
        };

        let material = match jwk.x5c.as_deref() {
            Some([leaf, ..]) if !matches!(material, KeyMaterial::Symmetric(_)) => {
                let der = Base64::decode_vec(leaf)
                    .map_err(|e| CryptoError::InvalidKey(format!("x5c: {}", e)))?;
                KeyMaterial::Certificate(CertificateKey::new(der, material)?)
            }
            _ => material,
        };

        let usage = match jwk.key_use.as_deref() {
            None => None,
            Some(u) => Some(
                KeyUsage::parse(u)
                    .ok_or_else(|| CryptoError::InvalidKey(format!("JWK use {}", u)))?,
            ),
        };
        let metadata = KeyMetadata {
            algorithm: jwk.alg.clone(),
            usage,
            ..KeyMetadata::default()
        };
        Ok(SecretKey::new(jwk.kid.clone(), material, metadata))
    }

    /// Export the key as a JWK, with private members only when asked.
    pub fn export_parameters(&self, include_private: bool) -> Result<Jwk, CryptoError> {
        let material = self.material()?;
        let mut jwk = Jwk::default();
        jwk.kid = self.key_id.clone();
        jwk.alg = self.metadata.algorithm.clone();
        jwk.key_use = self.metadata.usage.map(|u| u.as_str().to_string());

        if let KeyMaterial::Certificate(cert) = &*material {
            jwk.x5c = Some(vec![Base64::encode_string(cert.der())]);
            jwk.x5t_s256 = Some(base64url_encode(cert.thumbprint()));
        }

        match material.effective() {
            KeyMaterial::None | KeyMaterial::Certificate(_) => {
                return Err(CryptoError::Unsupported(
                    "key has no JWK representation".to_string(),
                ));
            }
            KeyMaterial::Symmetric(bytes) => {
                if !include_private {
                    return Err(CryptoError::Unsupported(
                        "symmetric keys have no public form".to_string(),
                    ));
                }
                jwk.kty = "oct".to_string();
                jwk.k = Some(base64url_encode(bytes));
            }
            KeyMaterial::Rsa(rsa) => {
                jwk.kty = "RSA".to_string();
                jwk.n = Some(base64url_encode(&rsa.public().n().to_bytes_be()));
                jwk.e = Some(base64url_encode(&rsa.public().e().to_bytes_be()));
                if let (true, Some(private)) = (include_private, rsa.private()) {
                    let primes = private.primes();
                    if primes.len() != 2 {
                        return Err(CryptoError::Unsupported(
                            "multi-prime RSA export".to_string(),
                        ));
                    }
                    jwk.d = Some(base64url_encode(&Zeroizing::new(private.d().to_bytes_be())));
                    jwk.p = Some(base64url_encode(&Zeroizing::new(primes[0].to_bytes_be())));
                    jwk.q = Some(base64url_encode(&Zeroizing::new(primes[1].to_bytes_be())));
                }
            }
            KeyMaterial::Ecc(ec) => {
                let (x, y) = ec.coordinates();
                jwk.kty = "EC".to_string();
                jwk.crv = Some(ec.curve().jwk_name().to_string());
                jwk.x = Some(base64url_encode(&x));
                jwk.y = Some(base64url_encode(&y));
                if include_private {
                    if let Some(d) = ec.private_scalar() {
                        jwk.d = Some(base64url_encode(&d));
                    }
                }
            }
        }
        Ok(jwk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeyType;

    fn jwk(kty: &str) -> Jwk {
        let mut jwk = Jwk::default();
        jwk.kty = kty.to_string();
        jwk
    }

    fn rsa_key() -> SecretKey {
        SecretKey::from_pkcs8_pem(
            Some("rsa-1".to_string()),
            include_str!("../../testdata/rsa2048.pem"),
        )
        .unwrap()
    }

    #[test]
    fn symmetric_round_trip() {
        let key = SecretKey::symmetric("oct-1", &[0xAB; 32]);
        let jwk = key.export_parameters(true).unwrap();
        assert_eq!(jwk.kty, "oct");
        assert_eq!(jwk.kid.as_deref(), Some("oct-1"));

        let imported = SecretKey::from_jwk(&jwk).unwrap();
        assert_eq!(imported.key_type().unwrap(), KeyType::Symmetric);
        assert_eq!(imported.key_size_bits().unwrap(), 256);
    }

    #[test]
    fn symmetric_public_export_is_refused() {
        let key = SecretKey::symmetric("oct-1", &[0xAB; 32]);
        assert!(key.export_parameters(false).is_err());
    }

    #[test]
    fn rsa_round_trip_private_and_public() {
        let key = rsa_key();
        let private = key.export_parameters(true).unwrap();
        assert!(private.is_private());
        assert!(private.p.is_some() && private.q.is_some());

        let restored = SecretKey::from_jwk(&private).unwrap();
        assert!(restored.has_private().unwrap());
        assert_eq!(restored.key_size_bits().unwrap(), 2048);

        let public = key.export_parameters(false).unwrap();
        assert!(!public.is_private());
        let restored = SecretKey::from_jwk(&public).unwrap();
        assert!(!restored.has_private().unwrap());
        assert_eq!(public, private.to_public());
    }

    #[test]
    fn ec_round_trip() {
        let secret = p384::SecretKey::random(&mut p256::elliptic_curve::rand_core::OsRng);
        let key = SecretKey::new(
            Some("ec-1".to_string()),
            KeyMaterial::Ecc(EcKey::from_p384(secret)),
            KeyMetadata::with_algorithm("ES384"),
        );
        let jwk = key.export_parameters(true).unwrap();
        assert_eq!(jwk.crv.as_deref(), Some("P-384"));
        assert_eq!(jwk.alg.as_deref(), Some("ES384"));

        let restored = SecretKey::from_jwk(&jwk).unwrap();
        assert_eq!(restored.key_size_bits().unwrap(), 384);
        assert_eq!(restored.export_parameters(true).unwrap(), jwk);
    }

    #[test]
    fn ec_rejects_mismatched_scalar() {
        let a = SecretKey::new(
            None,
            KeyMaterial::Ecc(EcKey::from_p256(p256::SecretKey::random(
                &mut p256::elliptic_curve::rand_core::OsRng,
            ))),
            KeyMetadata::default(),
        );
        let b = SecretKey::new(
            None,
            KeyMaterial::Ecc(EcKey::from_p256(p256::SecretKey::random(
                &mut p256::elliptic_curve::rand_core::OsRng,
            ))),
            KeyMetadata::default(),
        );
        let mut jwk = a.export_parameters(true).unwrap();
        jwk.d = b.export_parameters(true).unwrap().d.clone();
        assert!(SecretKey::from_jwk(&jwk).is_err());
    }

    #[test]
    fn certificate_exports_x5c_and_thumbprint() {
        let der = vec![0x30, 0x03, 0x02, 0x01, 0x01];
        let ec = EcKey::from_p256(p256::SecretKey::random(
            &mut p256::elliptic_curve::rand_core::OsRng,
        ));
        let key = SecretKey::new(
            Some("cert".to_string()),
            KeyMaterial::Certificate(CertificateKey::new(der.clone(), KeyMaterial::Ecc(ec)).unwrap()),
            KeyMetadata::default(),
        );
        let jwk = key.export_parameters(false).unwrap();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.x5c.as_ref().unwrap()[0], Base64::encode_string(&der));
        assert_eq!(
            jwk.x5t_s256.as_deref(),
            Some(base64url_encode(&Sha256::digest(&der)).as_str())
        );

        let restored = SecretKey::from_jwk(&jwk).unwrap();
        assert_eq!(restored.key_type().unwrap(), KeyType::Certificate);
        assert_eq!(restored.effective_key_type().unwrap(), KeyType::Ecc);
    }

    #[test]
    fn serializes_use_and_thumbprint_member_names() {
        let mut jwk = jwk("oct");
        jwk.key_use = Some("enc".to_string());
        jwk.x5t_s256 = Some("abc".to_string());
        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["use"], "enc");
        assert_eq!(json["x5t#S256"], "abc");
        assert!(json.get("k").is_none());
    }

    #[test]
    fn rfc7638_thumbprint_vector() {
        // RFC 7638 section 3.1
        let mut jwk = jwk("RSA");
        jwk.n = Some("0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw".to_string());
        jwk.e = Some("AQAB".to_string());
        jwk.alg = Some("RS256".to_string());
        jwk.kid = Some("2011-04-29".to_string());
        assert_eq!(
            jwk.thumbprint().unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn unknown_kty_is_unsupported() {
        assert!(matches!(
            SecretKey::from_jwk(&jwk("OKP")),
            Err(CryptoError::Unsupported(_))
        ));
    }

    #[test]
    fn debug_hides_private_members() {
        let mut jwk = jwk("oct");
        jwk.k = Some("c2VjcmV0LWtleS1tYXRlcmlhbA".to_string());
        assert!(!format!("{:?}", jwk).contains("c2VjcmV0"));
    }
}
