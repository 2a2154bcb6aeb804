//! Content encryption: AES-GCM and AES-CBC + HMAC-SHA2 (RFC 7518 §5).

use std::sync::Arc;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use subtle::ConstantTimeEq;
use tracing::trace;
use zeroize::{Zeroize, Zeroizing};

use super::mac::hmac;
use super::{validate_binding, CryptoFactory};
use crate::algorithm::{AeadKind, AlgorithmDescriptor, AlgorithmFamily, AlgorithmParams, HashAlg};
use crate::error::{rng_fill, CryptoError};
use crate::key::{KeyMaterial, SecretKey};

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

pub(super) const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const CBC_BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct AeadFactory;

impl CryptoFactory for AeadFactory {
    type Provider = AeadProvider;

    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::AuthenticatedEncryption
    }

    fn create_provider(
        &self,
        key: Arc<SecretKey>,
        descriptor: Arc<AlgorithmDescriptor>,
    ) -> Result<AeadProvider, CryptoError> {
        validate_binding(self.family(), &key, &descriptor)?;
        let AlgorithmParams::AuthenticatedEncryption(kind) = descriptor.params() else {
            return Err(CryptoError::FamilyMismatch {
                code: descriptor.code().to_string(),
                expected: self.family().name(),
            });
        };
        Ok(AeadProvider {
            key,
            descriptor,
            kind,
        })
    }
}

/// Output of one encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadOutput {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
}

#[derive(Debug)]
pub struct AeadProvider {
    key: Arc<SecretKey>,
    descriptor: Arc<AlgorithmDescriptor>,
    kind: AeadKind,
}

fn gcm_seal<C: KeyInit + AeadInPlace>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let cipher = C::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, &mut buffer)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok((buffer, tag.to_vec()))
}

/// Decrypt in place over `buffer`, which holds the ciphertext on entry.
fn gcm_open_in_place<C: KeyInit + AeadInPlace>(
    key: &[u8],
    iv: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<(), CryptoError> {
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::Integrity)?;
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::Integrity)
}

/// AES-GCM seal with the variant picked by key length.
pub(super) fn aes_gcm_seal(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    if iv.len() != GCM_IV_LEN {
        return Err(CryptoError::EncryptionFailed(format!(
            "AES-GCM IV must be {} bytes",
            GCM_IV_LEN
        )));
    }
    match key.len() {
        16 => gcm_seal::<Aes128Gcm>(key, iv, plaintext, aad),
        24 => gcm_seal::<Aes192Gcm>(key, iv, plaintext, aad),
        32 => gcm_seal::<Aes256Gcm>(key, iv, plaintext, aad),
        n => Err(CryptoError::InvalidKey(format!("AES-GCM key of {} bytes", n))),
    }
}

/// AES-GCM open; every failure is [`CryptoError::Integrity`].
pub(super) fn aes_gcm_open(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    aes_gcm_open_in_place(key, iv, &mut buffer, tag, aad)?;
    Ok(buffer)
}

fn aes_gcm_open_in_place(
    key: &[u8],
    iv: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<(), CryptoError> {
    if iv.len() != GCM_IV_LEN || tag.len() != GCM_TAG_LEN {
        return Err(CryptoError::Integrity);
    }
    match key.len() {
        16 => gcm_open_in_place::<Aes128Gcm>(key, iv, buffer, tag, aad),
        24 => gcm_open_in_place::<Aes192Gcm>(key, iv, buffer, tag, aad),
        32 => gcm_open_in_place::<Aes256Gcm>(key, iv, buffer, tag, aad),
        _ => Err(CryptoError::Integrity),
    }
}

fn cbc_encrypt(enc_key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let invalid = |_| CryptoError::InvalidKey("AES-CBC key or IV length".to_string());
    Ok(match enc_key.len() {
        16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(enc_key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(enc_key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => cbc::Encryptor::<aes::Aes256>::new_from_slices(enc_key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        n => {
            return Err(CryptoError::InvalidKey(format!(
                "AES-CBC key of {} bytes",
                n
            )))
        }
    })
}

/// Decrypt in place and strip the padding; returns the plaintext length.
fn cbc_decrypt_in_place(
    enc_key: &[u8],
    iv: &[u8],
    buffer: &mut [u8],
) -> Result<usize, CryptoError> {
    let result = match enc_key.len() {
        16 => cbc::Decryptor::<aes::Aes128>::new_from_slices(enc_key, iv)
            .map_err(|_| CryptoError::Integrity)?
            .decrypt_padded_mut::<Pkcs7>(buffer)
            .map(<[u8]>::len),
        24 => cbc::Decryptor::<aes::Aes192>::new_from_slices(enc_key, iv)
            .map_err(|_| CryptoError::Integrity)?
            .decrypt_padded_mut::<Pkcs7>(buffer)
            .map(<[u8]>::len),
        32 => cbc::Decryptor::<aes::Aes256>::new_from_slices(enc_key, iv)
            .map_err(|_| CryptoError::Integrity)?
            .decrypt_padded_mut::<Pkcs7>(buffer)
            .map(<[u8]>::len),
        _ => return Err(CryptoError::Integrity),
    };
    result.map_err(|_| CryptoError::Integrity)
}

/// Full-length HMAC over `aad || iv || ciphertext || AL`, where AL is the AAD
/// length in bits as a 64-bit big-endian integer.
fn cbc_hmac_tag(
    hash: HashAlg,
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let al = ((aad.len() as u64) * 8).to_be_bytes();
    hmac(hash, mac_key, &[aad, iv, ciphertext, &al])
}

impl AeadProvider {
    pub fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    /// The bound key.
    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    pub fn kind(&self) -> AeadKind {
        self.kind
    }

    pub fn ciphertext_length(&self, plaintext_len: usize) -> usize {
        self.kind.ciphertext_length(plaintext_len)
    }

    pub fn iv_size(&self) -> usize {
        self.kind.iv_size()
    }

    pub fn tag_size(&self) -> usize {
        self.kind.tag_size()
    }

    /// Encrypt under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<AeadOutput, CryptoError> {
        let mut iv = vec![0u8; self.iv_size()];
        rng_fill(&mut iv)?;
        self.encrypt_with_iv(plaintext, aad, iv)
    }

    pub(crate) fn encrypt_with_iv(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        iv: Vec<u8>,
    ) -> Result<AeadOutput, CryptoError> {
        if iv.len() != self.iv_size() {
            return Err(CryptoError::EncryptionFailed(format!(
                "IV must be {} bytes",
                self.iv_size()
            )));
        }
        let material = self.key.material()?;
        let KeyMaterial::Symmetric(key) = material.effective() else {
            return Err(CryptoError::MissingPrivateKey);
        };

        let (ciphertext, tag) = match self.kind {
            AeadKind::AesGcm { .. } => aes_gcm_seal(key, &iv, plaintext, aad)?,
            AeadKind::AesCbcHmac { hash, .. } => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                let ciphertext = cbc_encrypt(enc_key, &iv, plaintext)?;
                let mut full = cbc_hmac_tag(hash, mac_key, aad, &iv, &ciphertext)?;
                full.truncate(self.tag_size());
                (ciphertext, full)
            }
        };
        trace!(
            enc = self.descriptor.code(),
            len = ciphertext.len(),
            "content encrypted"
        );
        Ok(AeadOutput {
            ciphertext,
            iv,
            tag,
        })
    }

    /// Authenticate and decrypt. Any mismatch, including a wrong IV or tag
    /// length, is [`CryptoError::Integrity`].
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut out = Zeroizing::new(vec![0u8; ciphertext.len()]);
        let len = self.decrypt_into(ciphertext, iv, tag, aad, &mut out)?;
        out.truncate(len);
        Ok(out)
    }

    /// [`AeadProvider::decrypt`] into a caller buffer of at least
    /// `ciphertext.len()` bytes; returns the plaintext length. On failure the
    /// buffer is wiped.
    pub fn decrypt_into(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        tag: &[u8],
        aad: &[u8],
        out: &mut [u8],
    ) -> Result<usize, CryptoError> {
        let material = self.key.material()?;
        let KeyMaterial::Symmetric(key) = material.effective() else {
            return Err(CryptoError::Integrity);
        };
        if iv.len() != self.iv_size() || tag.len() != self.tag_size() {
            return Err(CryptoError::Integrity);
        }
        if out.len() < ciphertext.len() {
            return Err(CryptoError::Format(format!(
                "output buffer of {} bytes for {} bytes of ciphertext",
                out.len(),
                ciphertext.len()
            )));
        }
        let buffer = &mut out[..ciphertext.len()];

        let opened = match self.kind {
            AeadKind::AesGcm { .. } => {
                buffer.copy_from_slice(ciphertext);
                aes_gcm_open_in_place(key, iv, buffer, tag, aad).map(|()| ciphertext.len())
            }
            AeadKind::AesCbcHmac { hash, .. } => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                // The MAC is always computed in full and compared before any
                // decryption or padding check runs.
                let mut expected = cbc_hmac_tag(hash, mac_key, aad, iv, ciphertext)?;
                let matches: bool = expected[..tag.len()].ct_eq(tag).into();
                expected.zeroize();
                if !matches || ciphertext.is_empty() || ciphertext.len() % CBC_BLOCK_LEN != 0 {
                    return Err(CryptoError::Integrity);
                }
                buffer.copy_from_slice(ciphertext);
                cbc_decrypt_in_place(enc_key, iv, buffer)
            }
        };
        if opened.is_err() {
            buffer.zeroize();
        }
        opened
    }
}
