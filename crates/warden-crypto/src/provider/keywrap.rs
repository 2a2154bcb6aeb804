//! Key management: how the content encryption key (CEK) reaches the
//! recipient.
//!
//! Wrapping variants (`A*KW`, `A*GCMKW`, `ECDH-ES+A*KW`, `PBES2-*`,
//! `RSA-OAEP-256`) encrypt a CEK. Direct variants (`dir`, `ECDH-ES`) use the
//! key, or the agreed secret, as the CEK and emit an empty encrypted key.

use std::fmt;
use std::sync::Arc;

use aes_kw::{KekAes128, KekAes192, KekAes256};
use p256::elliptic_curve::rand_core::OsRng;
use rsa::Oaep;
use sha2::{Sha256, Sha384, Sha512};
use tracing::{debug, trace};
use zeroize::{Zeroize, Zeroizing};

use super::aead::{aes_gcm_open, aes_gcm_seal, GCM_IV_LEN};
use super::kdf::concat_kdf;
use super::{validate_binding, CryptoFactory};
use crate::algorithm::{
    AlgorithmDescriptor, AlgorithmFamily, AlgorithmParams, EcCurve, HashAlg, KeyWrapKind,
};
use crate::base64url::{base64url_decode, base64url_encode};
use crate::error::{rng_fill, CryptoError};
use crate::key::{EcKey, Jwk, KeyMaterial, SecretKey};

pub const DEFAULT_PBES2_ITERATIONS: u32 = 310_000;
pub const DEFAULT_PBES2_MAX_ITERATIONS: u32 = 1_000_000;

const PBES2_SALT_LEN: usize = 16;
const PBES2_MIN_SALT_LEN: usize = 8;
const AES_KW_OVERHEAD: usize = 8;

/// `apu` / `apv` for ECDH-ES key derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyInfo {
    pub apu: Vec<u8>,
    pub apv: Vec<u8>,
}

/// Per-token output of a key management algorithm, carried in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapParameters {
    None,
    /// `iv` and `tag` header parameters of AES-GCM key wrap.
    Gcm { iv: Vec<u8>, tag: Vec<u8> },
    /// Ephemeral public key plus the party information fed to Concat KDF.
    Ecdh { epk: Jwk, apu: Vec<u8>, apv: Vec<u8> },
    /// `p2s` (without the algorithm prefix) and `p2c`.
    Pbes2 { salt: Vec<u8>, count: u32 },
}

pub struct WrappedKey {
    pub cek: Zeroizing<Vec<u8>>,
    /// Empty for direct key agreement and `dir`.
    pub encrypted_key: Vec<u8>,
    pub parameters: WrapParameters,
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKey")
            .field("cek_len", &self.cek.len())
            .field("encrypted_key_len", &self.encrypted_key.len())
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyWrapFactory {
    pbes2_iterations: u32,
    pbes2_max_iterations: u32,
}

impl Default for KeyWrapFactory {
    fn default() -> Self {
        Self {
            pbes2_iterations: DEFAULT_PBES2_ITERATIONS,
            pbes2_max_iterations: DEFAULT_PBES2_MAX_ITERATIONS,
        }
    }
}

impl KeyWrapFactory {
    /// `iterations` is used for new tokens; `max_iterations` bounds the `p2c`
    /// accepted when unwrapping.
    pub fn with_pbes2(iterations: u32, max_iterations: u32) -> Self {
        Self {
            pbes2_iterations: iterations,
            pbes2_max_iterations: max_iterations.max(iterations),
        }
    }
}

impl CryptoFactory for KeyWrapFactory {
    type Provider = KeyWrapProvider;

    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::KeyManagement
    }

    fn create_provider(
        &self,
        key: Arc<SecretKey>,
        descriptor: Arc<AlgorithmDescriptor>,
    ) -> Result<KeyWrapProvider, CryptoError> {
        validate_binding(self.family(), &key, &descriptor)?;
        let AlgorithmParams::KeyManagement(kind) = descriptor.params() else {
            return Err(CryptoError::FamilyMismatch {
                code: descriptor.code().to_string(),
                expected: self.family().name(),
            });
        };
        Ok(KeyWrapProvider {
            key,
            descriptor,
            kind,
            pbes2_iterations: self.pbes2_iterations,
            pbes2_max_iterations: self.pbes2_max_iterations,
            party: PartyInfo::default(),
        })
    }
}

#[derive(Debug)]
pub struct KeyWrapProvider {
    key: Arc<SecretKey>,
    descriptor: Arc<AlgorithmDescriptor>,
    kind: KeyWrapKind,
    pbes2_iterations: u32,
    pbes2_max_iterations: u32,
    party: PartyInfo,
}

// ============================================================================
// Primitives
// ============================================================================

fn symmetric(material: &KeyMaterial) -> Result<&[u8], CryptoError> {
    match material.effective() {
        KeyMaterial::Symmetric(bytes) => Ok(bytes),
        other => Err(CryptoError::KeyTypeMismatch {
            algorithm: "symmetric key management".to_string(),
            got: other.key_type().name(),
        }),
    }
}

fn elliptic(material: &KeyMaterial) -> Result<&EcKey, CryptoError> {
    match material.effective() {
        KeyMaterial::Ecc(ec) => Ok(ec),
        other => Err(CryptoError::KeyTypeMismatch {
            algorithm: "ECDH-ES".to_string(),
            got: other.key_type().name(),
        }),
    }
}

fn content_key_len(enc: &AlgorithmDescriptor) -> Result<usize, CryptoError> {
    match enc.params() {
        AlgorithmParams::AuthenticatedEncryption(kind) => Ok(kind.key_len()),
        _ => Err(CryptoError::FamilyMismatch {
            code: enc.code().to_string(),
            expected: AlgorithmFamily::AuthenticatedEncryption.name(),
        }),
    }
}

fn aes_kw_wrap(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = vec![0u8; cek.len() + AES_KW_OVERHEAD];
    let invalid = |_| CryptoError::InvalidKey(format!("AES-KW key of {} bytes", kek.len()));
    let result = match kek.len() {
        16 => {
            let mut array: [u8; 16] = kek.try_into().map_err(invalid)?;
            let result = KekAes128::from(array).wrap(cek, &mut out);
            array.zeroize();
            result
        }
        24 => {
            let mut array: [u8; 24] = kek.try_into().map_err(invalid)?;
            let result = KekAes192::from(array).wrap(cek, &mut out);
            array.zeroize();
            result
        }
        32 => {
            let mut array: [u8; 32] = kek.try_into().map_err(invalid)?;
            let result = KekAes256::from(array).wrap(cek, &mut out);
            array.zeroize();
            result
        }
        n => return Err(CryptoError::InvalidKey(format!("AES-KW key of {} bytes", n))),
    };
    result.map_err(|e| CryptoError::EncryptionFailed(format!("AES-KW: {:?}", e)))?;
    Ok(out)
}

/// Every failure, including malformed input, is an integrity failure.
fn aes_kw_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if wrapped.len() < 16 + AES_KW_OVERHEAD || wrapped.len() % 8 != 0 {
        return Err(CryptoError::Integrity);
    }
    let mut out = Zeroizing::new(vec![0u8; wrapped.len() - AES_KW_OVERHEAD]);
    let result = match kek.len() {
        16 => {
            let mut array: [u8; 16] = kek.try_into().map_err(|_| CryptoError::Integrity)?;
            let result = KekAes128::from(array).unwrap(wrapped, &mut out);
            array.zeroize();
            result
        }
        24 => {
            let mut array: [u8; 24] = kek.try_into().map_err(|_| CryptoError::Integrity)?;
            let result = KekAes192::from(array).unwrap(wrapped, &mut out);
            array.zeroize();
            result
        }
        32 => {
            let mut array: [u8; 32] = kek.try_into().map_err(|_| CryptoError::Integrity)?;
            let result = KekAes256::from(array).unwrap(wrapped, &mut out);
            array.zeroize();
            result
        }
        _ => return Err(CryptoError::Integrity),
    };
    result.map_err(|_| CryptoError::Integrity)?;
    Ok(out)
}

fn oaep(hash: HashAlg) -> Oaep {
    match hash {
        HashAlg::Sha256 => Oaep::new::<Sha256>(),
        HashAlg::Sha384 => Oaep::new::<Sha384>(),
        HashAlg::Sha512 => Oaep::new::<Sha512>(),
    }
}

/// PBES2 KEK: PBKDF2 over the password with salt `alg || 0x00 || p2s`.
fn pbes2_kek(
    hash: HashAlg,
    password: &[u8],
    algorithm: &str,
    salt: &[u8],
    count: u32,
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut salt_input = Vec::with_capacity(algorithm.len() + 1 + salt.len());
    salt_input.extend_from_slice(algorithm.as_bytes());
    salt_input.push(0);
    salt_input.extend_from_slice(salt);

    let mut kek = Zeroizing::new(vec![0u8; len]);
    match hash {
        HashAlg::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, &salt_input, count, &mut kek),
        HashAlg::Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(password, &salt_input, count, &mut kek),
        HashAlg::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, &salt_input, count, &mut kek),
    }
    kek
}

fn epk_jwk(ephemeral: &EcKey) -> Jwk {
    let (x, y) = ephemeral.coordinates();
    let mut jwk = Jwk::default();
    jwk.kty = "EC".to_string();
    jwk.crv = Some(ephemeral.curve().jwk_name().to_string());
    jwk.x = Some(base64url_encode(&x));
    jwk.y = Some(base64url_encode(&y));
    jwk
}

/// Parse and curve-check the sender's ephemeral key.
fn epk_from_jwk(jwk: &Jwk) -> Result<EcKey, CryptoError> {
    if jwk.kty != "EC" {
        return Err(CryptoError::Format(format!("epk key type {}", jwk.kty)));
    }
    let curve = jwk
        .crv
        .as_deref()
        .and_then(EcCurve::from_jwk_name)
        .ok_or_else(|| CryptoError::Format("epk curve".to_string()))?;
    let coordinate = |value: &Option<String>, name: &str| {
        value
            .as_deref()
            .ok_or_else(|| CryptoError::Format(format!("epk is missing {}", name)))
            .and_then(base64url_decode)
    };
    let x = coordinate(&jwk.x, "x")?;
    let y = coordinate(&jwk.y, "y")?;
    EcKey::from_coordinates(curve, &x, &y).map_err(|_| CryptoError::Integrity)
}

/// Agree with `recipient` using a fresh ephemeral key on the same curve.
fn ecdh_ephemeral(recipient: &EcKey) -> (Zeroizing<Vec<u8>>, Jwk) {
    match recipient {
        EcKey::P256 { public, .. } => {
            let ephemeral = p256::SecretKey::random(&mut OsRng);
            let shared =
                p256::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), public.as_affine());
            let z = Zeroizing::new(shared.raw_secret_bytes().to_vec());
            (z, epk_jwk(&EcKey::from_p256(ephemeral)))
        }
        EcKey::P384 { public, .. } => {
            let ephemeral = p384::SecretKey::random(&mut OsRng);
            let shared =
                p384::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), public.as_affine());
            let z = Zeroizing::new(shared.raw_secret_bytes().to_vec());
            (z, epk_jwk(&EcKey::from_p384(ephemeral)))
        }
    }
}

/// Recipient side of the agreement.
fn ecdh_static(recipient: &EcKey, epk: &EcKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    match (recipient, epk) {
        (
            EcKey::P256 {
                secret: Some(secret),
                ..
            },
            EcKey::P256 { public, .. },
        ) => {
            let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        (
            EcKey::P384 {
                secret: Some(secret),
                ..
            },
            EcKey::P384 { public, .. },
        ) => {
            let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        _ if !recipient.has_private() => Err(CryptoError::MissingPrivateKey),
        _ => Err(CryptoError::Integrity),
    }
}

// ============================================================================
// Provider
// ============================================================================

impl KeyWrapProvider {
    pub fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    /// The bound key.
    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    pub fn kind(&self) -> KeyWrapKind {
        self.kind
    }

    /// True when the CEK is the key or the agreed secret, so the encrypted key
    /// is empty.
    pub fn is_direct(&self) -> bool {
        matches!(
            self.kind,
            KeyWrapKind::Direct | KeyWrapKind::EcdhEs { wrap_bits: None }
        )
    }

    /// Party information used by ECDH-ES when wrapping.
    pub fn with_party_info(mut self, party: PartyInfo) -> Self {
        self.party = party;
        self
    }

    /// Produce a CEK for `enc` and whatever the recipient needs to recover it.
    pub fn wrap_new_key(&self, enc: &AlgorithmDescriptor) -> Result<WrappedKey, CryptoError> {
        let cek_len = content_key_len(enc)?;
        match self.kind {
            KeyWrapKind::Direct => {
                let material = self.key.material()?;
                let key = symmetric(&material)?;
                if key.len() != cek_len {
                    return Err(CryptoError::InvalidKeySize {
                        algorithm: enc.code().to_string(),
                        bits: key.len() * 8,
                    });
                }
                Ok(WrappedKey {
                    cek: Zeroizing::new(key.to_vec()),
                    encrypted_key: Vec::new(),
                    parameters: WrapParameters::None,
                })
            }
            KeyWrapKind::EcdhEs { wrap_bits: None } => {
                let material = self.key.material()?;
                let (z, epk) = ecdh_ephemeral(elliptic(&material)?);
                let cek = concat_kdf(
                    &z,
                    enc.code(),
                    &self.party.apu,
                    &self.party.apv,
                    (cek_len * 8) as u32,
                );
                trace!(enc = enc.code(), "content key agreed");
                Ok(WrappedKey {
                    cek,
                    encrypted_key: Vec::new(),
                    parameters: WrapParameters::Ecdh {
                        epk,
                        apu: self.party.apu.clone(),
                        apv: self.party.apv.clone(),
                    },
                })
            }
            _ => {
                let mut cek = Zeroizing::new(vec![0u8; cek_len]);
                rng_fill(&mut cek)?;
                self.wrap_key(&cek, enc)
            }
        }
    }

    /// Wrap a caller-supplied CEK. Direct variants cannot do this.
    pub fn wrap_key(
        &self,
        cek: &[u8],
        enc: &AlgorithmDescriptor,
    ) -> Result<WrappedKey, CryptoError> {
        let cek_len = content_key_len(enc)?;
        if cek.len() != cek_len {
            return Err(CryptoError::InvalidKeySize {
                algorithm: enc.code().to_string(),
                bits: cek.len() * 8,
            });
        }
        let material = self.key.material()?;
        let (encrypted_key, parameters) = match self.kind {
            KeyWrapKind::Direct | KeyWrapKind::EcdhEs { wrap_bits: None } => {
                return Err(CryptoError::Unsupported(format!(
                    "{} derives the content key and cannot wrap one",
                    self.descriptor.code()
                )));
            }
            KeyWrapKind::AesKw { .. } => {
                (aes_kw_wrap(symmetric(&material)?, cek)?, WrapParameters::None)
            }
            KeyWrapKind::AesGcmKw { .. } => {
                let mut iv = vec![0u8; GCM_IV_LEN];
                rng_fill(&mut iv)?;
                let (ciphertext, tag) = aes_gcm_seal(symmetric(&material)?, &iv, cek, &[])?;
                (ciphertext, WrapParameters::Gcm { iv, tag })
            }
            KeyWrapKind::EcdhEs {
                wrap_bits: Some(bits),
            } => {
                let (z, epk) = ecdh_ephemeral(elliptic(&material)?);
                let kek = concat_kdf(
                    &z,
                    self.descriptor.code(),
                    &self.party.apu,
                    &self.party.apv,
                    bits as u32,
                );
                (
                    aes_kw_wrap(&kek, cek)?,
                    WrapParameters::Ecdh {
                        epk,
                        apu: self.party.apu.clone(),
                        apv: self.party.apv.clone(),
                    },
                )
            }
            KeyWrapKind::Pbes2 { hash, wrap_bits } => {
                let mut salt = vec![0u8; PBES2_SALT_LEN];
                rng_fill(&mut salt)?;
                let count = self.pbes2_iterations;
                let kek = pbes2_kek(
                    hash,
                    symmetric(&material)?,
                    self.descriptor.code(),
                    &salt,
                    count,
                    wrap_bits / 8,
                );
                (aes_kw_wrap(&kek, cek)?, WrapParameters::Pbes2 { salt, count })
            }
            KeyWrapKind::RsaOaep(hash) => {
                let KeyMaterial::Rsa(rsa) = material.effective() else {
                    return Err(CryptoError::KeyTypeMismatch {
                        algorithm: self.descriptor.code().to_string(),
                        got: material.effective().key_type().name(),
                    });
                };
                let encrypted = rsa
                    .public()
                    .encrypt(&mut OsRng, oaep(hash), cek)
                    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
                (encrypted, WrapParameters::None)
            }
        };
        trace!(
            alg = self.descriptor.code(),
            enc = enc.code(),
            "content key wrapped"
        );
        Ok(WrappedKey {
            cek: Zeroizing::new(cek.to_vec()),
            encrypted_key,
            parameters,
        })
    }

    /// Recover the CEK for `enc`.
    ///
    /// Authentication failures are [`CryptoError::Integrity`]. Missing or
    /// malformed header parameters are [`CryptoError::Format`].
    pub fn unwrap_key(
        &self,
        encrypted_key: &[u8],
        parameters: &WrapParameters,
        enc: &AlgorithmDescriptor,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let cek_len = content_key_len(enc)?;
        let material = self.key.material()?;
        let cek = match self.kind {
            KeyWrapKind::Direct => {
                if !encrypted_key.is_empty() {
                    return Err(CryptoError::Integrity);
                }
                Zeroizing::new(symmetric(&material)?.to_vec())
            }
            KeyWrapKind::AesKw { .. } => aes_kw_unwrap(symmetric(&material)?, encrypted_key)?,
            KeyWrapKind::AesGcmKw { .. } => {
                let WrapParameters::Gcm { iv, tag } = parameters else {
                    return Err(CryptoError::Format("missing iv/tag header".to_string()));
                };
                aes_gcm_open(symmetric(&material)?, iv, encrypted_key, tag, &[])?
            }
            KeyWrapKind::EcdhEs { wrap_bits } => {
                let WrapParameters::Ecdh { epk, apu, apv } = parameters else {
                    return Err(CryptoError::Format("missing epk header".to_string()));
                };
                let z = ecdh_static(elliptic(&material)?, &epk_from_jwk(epk)?)?;
                match wrap_bits {
                    None => {
                        if !encrypted_key.is_empty() {
                            return Err(CryptoError::Integrity);
                        }
                        concat_kdf(&z, enc.code(), apu, apv, (cek_len * 8) as u32)
                    }
                    Some(bits) => {
                        let kek = concat_kdf(&z, self.descriptor.code(), apu, apv, bits as u32);
                        aes_kw_unwrap(&kek, encrypted_key)?
                    }
                }
            }
            KeyWrapKind::Pbes2 { hash, wrap_bits } => {
                let WrapParameters::Pbes2 { salt, count } = parameters else {
                    return Err(CryptoError::Format("missing p2s/p2c header".to_string()));
                };
                if *count == 0 || *count > self.pbes2_max_iterations {
                    debug!(p2c = *count, "rejected PBES2 iteration count");
                    return Err(CryptoError::Format(format!(
                        "p2c must be between 1 and {}",
                        self.pbes2_max_iterations
                    )));
                }
                if salt.len() < PBES2_MIN_SALT_LEN {
                    return Err(CryptoError::Format("p2s is too short".to_string()));
                }
                let kek = pbes2_kek(
                    hash,
                    symmetric(&material)?,
                    self.descriptor.code(),
                    salt,
                    *count,
                    wrap_bits / 8,
                );
                aes_kw_unwrap(&kek, encrypted_key)?
            }
            KeyWrapKind::RsaOaep(hash) => {
                let KeyMaterial::Rsa(rsa) = material.effective() else {
                    return Err(CryptoError::Integrity);
                };
                let private = rsa.private().ok_or(CryptoError::MissingPrivateKey)?;
                // A decryption failure yields a random CEK so the token fails
                // later at tag verification, indistinguishable from a bad tag.
                match private.decrypt(oaep(hash), encrypted_key) {
                    Ok(cek) if cek.len() == cek_len => Zeroizing::new(cek),
                    Ok(mut wrong) => {
                        wrong.zeroize();
                        random_cek(cek_len)?
                    }
                    Err(_) => random_cek(cek_len)?,
                }
            }
        };
        if cek.len() != cek_len {
            return Err(CryptoError::Integrity);
        }
        Ok(cek)
    }
}

fn random_cek(len: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut cek = Zeroizing::new(vec![0u8; len]);
    rng_fill(&mut cek)?;
    Ok(cek)
}
