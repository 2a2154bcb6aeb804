//! HMAC over the SHA-2 family, shared by signatures, CBC-HMAC and PBES2.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};

use crate::algorithm::HashAlg;
use crate::error::CryptoError;

fn compute<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(format!("HMAC key: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// HMAC of the concatenation of `parts`.
pub(crate) fn hmac(hash: HashAlg, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    match hash {
        HashAlg::Sha256 => compute::<Hmac<Sha256>>(key, parts),
        HashAlg::Sha384 => compute::<Hmac<Sha384>>(key, parts),
        HashAlg::Sha512 => compute::<Hmac<Sha512>>(key, parts),
    }
}
