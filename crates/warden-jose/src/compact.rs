//! Compact serialization: dot-separated Base64URL segments.
//!
//! The segment count alone selects the mode: 3 for JWS, 5 for JWE.

use crate::error::JoseError;

/// `header.payload.signature`, borrowed from the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwsParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
    /// `header.payload` exactly as received.
    pub signing_input: &'a str,
}

/// `header.encrypted_key.iv.ciphertext.tag`, borrowed from the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JweParts<'a> {
    pub header: &'a str,
    pub encrypted_key: &'a str,
    pub iv: &'a str,
    pub ciphertext: &'a str,
    pub tag: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactToken<'a> {
    Jws(JwsParts<'a>),
    Jwe(JweParts<'a>),
}

impl<'a> CompactToken<'a> {
    /// Split `token` into its segments. No segment is decoded here.
    pub fn parse(token: &'a str) -> Result<Self, JoseError> {
        let segments: Vec<&str> = token.split('.').collect();
        match segments[..] {
            [header, payload, signature] => Ok(CompactToken::Jws(JwsParts {
                header,
                payload,
                signature,
                signing_input: &token[..header.len() + 1 + payload.len()],
            })),
            [header, encrypted_key, iv, ciphertext, tag] => Ok(CompactToken::Jwe(JweParts {
                header,
                encrypted_key,
                iv,
                ciphertext,
                tag,
            })),
            _ => Err(JoseError::Format(format!(
                "expected 3 or 5 segments, found {}",
                segments.len()
            ))),
        }
    }

    pub fn header(&self) -> &'a str {
        match self {
            CompactToken::Jws(parts) => parts.header,
            CompactToken::Jwe(parts) => parts.header,
        }
    }

    pub fn is_jwe(&self) -> bool {
        matches!(self, CompactToken::Jwe(_))
    }
}
