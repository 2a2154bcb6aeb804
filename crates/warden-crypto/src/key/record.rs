//! Persisted secret records: the import boundary for externally stored keys.

use std::fmt;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::jwk::Jwk;
use super::material::KeyMaterial;
use super::{KeyMetadata, SecretKey};
use crate::algorithm::KeyType;
use crate::base64url::{base64url_decode, base64url_encode};
use crate::error::CryptoError;

pub const ENCODING_BASE64URL: &str = "base64url";
pub const ENCODING_JWK: &str = "jwk";
pub const ENCODING_PKCS8: &str = "pkcs8";
/// Padded standard alphabet, written by older stores. Read-only.
pub const ENCODING_LEGACY_BASE64: &str = "base64";

/// One stored secret as handed over by the persistence layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("key_id", &self.key_id)
            .field("encoding", &self.encoding)
            .field("algorithm", &self.algorithm)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ImportedSecret {
    pub key: SecretKey,
    /// The record should be rewritten with [`serialize_record`].
    pub requires_migration: bool,
}

fn metadata_for(record: &SecretRecord) -> KeyMetadata {
    KeyMetadata {
        algorithm: record.algorithm.clone(),
        ..KeyMetadata::default()
    }
}

fn symmetric_only(record: &SecretRecord, declared: KeyType) -> Result<(), CryptoError> {
    if declared == KeyType::Symmetric {
        Ok(())
    } else {
        Err(CryptoError::Format(format!(
            "{} encoding cannot hold a {} key",
            record.encoding,
            declared.name()
        )))
    }
}

/// Decode a stored record into a key.
pub fn deserialize_record(record: &SecretRecord) -> Result<ImportedSecret, CryptoError> {
    let declared = KeyType::from_name(&record.key_type)
        .ok_or_else(|| CryptoError::Format(format!("unknown key type {}", record.key_type)))?;

    let (key, mut requires_migration) = match record.encoding.as_str() {
        ENCODING_BASE64URL => {
            symmetric_only(record, declared)?;
            let bytes = Zeroizing::new(base64url_decode(&record.value)?);
            let key = SecretKey::new(
                record.key_id.clone(),
                KeyMaterial::symmetric(&bytes),
                metadata_for(record),
            );
            (key, false)
        }
        ENCODING_LEGACY_BASE64 => {
            symmetric_only(record, declared)?;
            let bytes = Zeroizing::new(
                Base64::decode_vec(&record.value)
                    .map_err(|e| CryptoError::Format(format!("legacy base64: {}", e)))?,
            );
            let key = SecretKey::new(
                record.key_id.clone(),
                KeyMaterial::symmetric(&bytes),
                metadata_for(record),
            );
            (key, true)
        }
        ENCODING_JWK => {
            let mut jwk: Jwk = serde_json::from_str(&record.value)
                .map_err(|e| CryptoError::Format(format!("JWK record: {}", e)))?;
            let mut stale = false;
            if record.key_id.is_some() && jwk.kid != record.key_id {
                stale = true;
                jwk.kid = record.key_id.clone();
            }
            if record.algorithm.is_some() && jwk.alg != record.algorithm {
                stale = true;
                jwk.alg = record.algorithm.clone();
            }
            (SecretKey::from_jwk(&jwk)?, stale)
        }
        ENCODING_PKCS8 => {
            let der = Zeroizing::new(base64url_decode(&record.value)?);
            let key = SecretKey::from_pkcs8_der(record.key_id.clone(), &der)?
                .with_metadata(metadata_for(record));
            (key, true)
        }
        other => {
            return Err(CryptoError::Format(format!("unknown secret encoding {}", other)));
        }
    };

    if key.key_type()? != declared {
        warn!(
            kid = record.key_id.as_deref(),
            declared = declared.name(),
            actual = key.key_type()?.name(),
            "secret record type disagrees with its value"
        );
        requires_migration = true;
    }
    if requires_migration {
        debug!(
            kid = record.key_id.as_deref(),
            encoding = %record.encoding,
            "secret record needs migration"
        );
    }
    Ok(ImportedSecret {
        key,
        requires_migration,
    })
}

/// Encode a key in the current canonical form: `base64url` for symmetric keys,
/// `jwk` for everything else.
pub fn serialize_record(key: &SecretKey) -> Result<SecretRecord, CryptoError> {
    let key_type = key.key_type()?;
    let symmetric = match &*key.material()? {
        KeyMaterial::None => {
            return Err(CryptoError::Unsupported(
                "the empty key cannot be persisted".to_string(),
            ))
        }
        KeyMaterial::Symmetric(bytes) => Some(base64url_encode(bytes)),
        _ => None,
    };
    let (encoding, value) = match symmetric {
        Some(value) => (ENCODING_BASE64URL, value),
        None => {
            let jwk = key.export_parameters(true)?;
            let json = serde_json::to_string(&jwk)
                .map_err(|e| CryptoError::Format(format!("JWK record: {}", e)))?;
            (ENCODING_JWK, json)
        }
    };
    Ok(SecretRecord {
        key_id: key.key_id()?.map(str::to_string),
        encoding: encoding.to_string(),
        algorithm: key.metadata()?.algorithm.clone(),
        key_type: key_type.name().to_string(),
        value,
    })
}
