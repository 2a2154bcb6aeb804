//! JOSE header: an insertion-ordered JSON object with typed accessors.
//!
//! On decode the header segment exactly as received is used as AAD, so
//! re-serializing a parsed [`Header`] never has to be byte-exact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_crypto::{base64url_decode, base64url_encode, Jwk, KeyWrapKind, WrapParameters};

use crate::error::JoseError;

pub const ALG: &str = "alg";
pub const ENC: &str = "enc";
pub const ZIP: &str = "zip";
pub const KID: &str = "kid";
pub const CTY: &str = "cty";
pub const TYP: &str = "typ";
pub const CRIT: &str = "crit";

const EPK: &str = "epk";
const APU: &str = "apu";
const APV: &str = "apv";
const IV: &str = "iv";
const TAG: &str = "tag";
const P2S: &str = "p2s";
const P2C: &str = "p2c";

/// Parameters defined by RFC 7515/7516/7518; these may not appear in `crit`.
const REGISTERED: &[&str] = &[
    ALG, ENC, ZIP, KID, CTY, TYP, CRIT, EPK, APU, APV, IV, TAG, P2S, P2C, "jku", "jwk", "x5u",
    "x5c", "x5t", "x5t#S256",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header {
    fields: Map<String, Value>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builder-style [`Header::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn alg(&self) -> Option<&str> {
        self.get_str(ALG)
    }

    pub fn enc(&self) -> Option<&str> {
        self.get_str(ENC)
    }

    pub fn zip(&self) -> Option<&str> {
        self.get_str(ZIP)
    }

    pub fn kid(&self) -> Option<&str> {
        self.get_str(KID)
    }

    pub fn cty(&self) -> Option<&str> {
        self.get_str(CTY)
    }

    pub fn typ(&self) -> Option<&str> {
        self.get_str(TYP)
    }

    /// `cty` names a nested JWT (`JWT`, case-insensitive, optional
    /// `application/` prefix).
    pub fn is_nested_jwt(&self) -> bool {
        self.cty().is_some_and(|cty| {
            let cty = cty.strip_prefix("application/").unwrap_or(cty);
            cty.eq_ignore_ascii_case("jwt")
        })
    }

    /// Names listed in `crit`, or an empty list when absent.
    ///
    /// A `crit` that is not a non-empty array of strings, names a registered
    /// parameter, or names a parameter missing from the header is malformed.
    pub fn critical(&self) -> Result<Vec<&str>, JoseError> {
        let Some(value) = self.get(CRIT) else {
            return Ok(Vec::new());
        };
        let names = value
            .as_array()
            .filter(|names| !names.is_empty())
            .ok_or_else(|| JoseError::Format("crit must be a non-empty array".to_string()))?;
        names
            .iter()
            .map(|name| {
                let name = name
                    .as_str()
                    .ok_or_else(|| JoseError::Format("crit entries must be strings".to_string()))?;
                if REGISTERED.contains(&name) {
                    return Err(JoseError::Format(format!(
                        "crit may not list registered parameter {}",
                        name
                    )));
                }
                if !self.contains(name) {
                    return Err(JoseError::Format(format!(
                        "critical parameter {} is missing",
                        name
                    )));
                }
                Ok(name)
            })
            .collect()
    }

    /// Mandated fields in order, then every extra field not already present.
    pub(crate) fn merged(mandated: Header, extra: Option<&Header>) -> Header {
        let mut merged = mandated;
        for (name, value) in extra.into_iter().flat_map(Header::iter) {
            if !merged.contains(name) {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Serialize to JSON and Base64URL-encode: the first compact segment.
    pub fn to_segment(&self) -> Result<String, JoseError> {
        Ok(base64url_encode(&serde_json::to_vec(&self.fields)?))
    }

    /// Parse the first compact segment. Anything but a JSON object is a
    /// format error.
    pub fn from_segment(segment: &str) -> Result<Header, JoseError> {
        let json = base64url_decode(segment)?;
        match serde_json::from_slice::<Value>(&json)? {
            Value::Object(fields) => Ok(Header { fields }),
            _ => Err(JoseError::Format("header is not a JSON object".to_string())),
        }
    }

    /// Record what the recipient needs to recover the CEK.
    pub(crate) fn set_wrap_parameters(
        &mut self,
        parameters: &WrapParameters,
    ) -> Result<(), JoseError> {
        match parameters {
            WrapParameters::None => {}
            WrapParameters::Gcm { iv, tag } => {
                self.insert(IV, base64url_encode(iv));
                self.insert(TAG, base64url_encode(tag));
            }
            WrapParameters::Ecdh { epk, apu, apv } => {
                self.insert(EPK, serde_json::to_value(epk)?);
                if !apu.is_empty() {
                    self.insert(APU, base64url_encode(apu));
                }
                if !apv.is_empty() {
                    self.insert(APV, base64url_encode(apv));
                }
            }
            WrapParameters::Pbes2 { salt, count } => {
                self.insert(P2S, base64url_encode(salt));
                self.insert(P2C, *count);
            }
        }
        Ok(())
    }

    /// Read the per-token parameters `kind` needs. Missing or malformed
    /// values are format errors.
    pub(crate) fn wrap_parameters(&self, kind: KeyWrapKind) -> Result<WrapParameters, JoseError> {
        match kind {
            KeyWrapKind::AesGcmKw { .. } => Ok(WrapParameters::Gcm {
                iv: self.required_bytes(IV)?,
                tag: self.required_bytes(TAG)?,
            }),
            KeyWrapKind::EcdhEs { .. } => {
                let epk = self
                    .get(EPK)
                    .ok_or_else(|| JoseError::Format("missing epk header".to_string()))?;
                let epk: Jwk = serde_json::from_value(epk.clone())?;
                Ok(WrapParameters::Ecdh {
                    epk,
                    apu: self.optional_bytes(APU)?,
                    apv: self.optional_bytes(APV)?,
                })
            }
            KeyWrapKind::Pbes2 { .. } => {
                let count = self
                    .get(P2C)
                    .and_then(Value::as_u64)
                    .and_then(|count| u32::try_from(count).ok())
                    .ok_or_else(|| JoseError::Format("missing or invalid p2c header".to_string()))?;
                Ok(WrapParameters::Pbes2 {
                    salt: self.required_bytes(P2S)?,
                    count,
                })
            }
            KeyWrapKind::Direct | KeyWrapKind::AesKw { .. } | KeyWrapKind::RsaOaep(_) => {
                Ok(WrapParameters::None)
            }
        }
    }

    fn required_bytes(&self, name: &str) -> Result<Vec<u8>, JoseError> {
        let value = self
            .get_str(name)
            .ok_or_else(|| JoseError::Format(format!("missing {} header", name)))?;
        Ok(base64url_decode(value)?)
    }

    fn optional_bytes(&self, name: &str) -> Result<Vec<u8>, JoseError> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::String(value)) => Ok(base64url_decode(value)?),
            Some(_) => Err(JoseError::Format(format!("{} must be a string", name))),
        }
    }
}
