//! Unpadded URL-safe Base64 (RFC 4648 §5), as used by every JOSE segment.

use base64ct::{Base64UrlUnpadded, Encoding};

use crate::error::CryptoError;

/// Number of characters needed to encode `byte_len` bytes without padding.
pub const fn encoded_len(byte_len: usize) -> usize {
    (byte_len * 4 + 2) / 3
}

/// Number of bytes encoded by `encoded_len` characters.
///
/// A remainder of one character modulo four can never come from a valid
/// byte count.
pub fn decoded_len(encoded_len: usize) -> Result<usize, CryptoError> {
    if encoded_len % 4 == 1 {
        return Err(CryptoError::Format(format!(
            "base64url: length {} is not a valid encoding length",
            encoded_len
        )));
    }
    Ok(encoded_len * 3 / 4)
}

/// Base64url encode bytes without padding.
pub fn base64url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

/// Encode into a caller-supplied buffer, returning the written prefix.
pub fn base64url_encode_into<'a>(data: &[u8], dst: &'a mut [u8]) -> Result<&'a str, CryptoError> {
    let needed = encoded_len(data.len());
    if dst.len() < needed {
        return Err(CryptoError::Format(format!(
            "base64url: destination holds {} bytes, {} needed",
            dst.len(),
            needed
        )));
    }
    Base64UrlUnpadded::encode(data, &mut dst[..needed])
        .map_err(|e| CryptoError::Format(format!("base64url: {}", e)))
}

/// Base64url decode a string to bytes.
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    decoded_len(s.len())?;
    Ok(Base64UrlUnpadded::decode_vec(s)?)
}

/// Decode into a caller-supplied buffer, returning the written prefix.
///
/// Nothing is allocated, so sensitive plaintext stays in `dst`.
pub fn base64url_decode_into<'a>(s: &str, dst: &'a mut [u8]) -> Result<&'a [u8], CryptoError> {
    let needed = decoded_len(s.len())?;
    if dst.len() < needed {
        return Err(CryptoError::Format(format!(
            "base64url: destination holds {} bytes, {} needed",
            dst.len(),
            needed
        )));
    }
    Ok(Base64UrlUnpadded::decode(s, &mut dst[..needed])?)
}
