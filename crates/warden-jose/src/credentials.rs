//! What to sign or encrypt with: an algorithm plus either an explicit key or
//! a collection to select from.

use std::sync::Arc;

use warden_crypto::{PartyInfo, SecretKey, SecretKeyCollection};

#[derive(Debug, Clone)]
pub enum KeySource {
    Key(Arc<SecretKey>),
    /// Select from `keys`, restricted to `kid` when given.
    Collection {
        keys: SecretKeyCollection,
        kid: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct SigningCredentials {
    pub algorithm: String,
    pub source: KeySource,
}

impl SigningCredentials {
    pub fn new(algorithm: impl Into<String>, key: Arc<SecretKey>) -> Self {
        Self {
            algorithm: algorithm.into(),
            source: KeySource::Key(key),
        }
    }

    pub fn from_collection(
        algorithm: impl Into<String>,
        keys: SecretKeyCollection,
        kid: Option<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            source: KeySource::Collection { keys, kid },
        }
    }

    /// `alg: none`.
    pub fn unsecured() -> Self {
        Self::new("none", Arc::new(SecretKey::none()))
    }
}

#[derive(Debug, Clone)]
pub struct EncryptingCredentials {
    /// Key management algorithm (`alg`).
    pub algorithm: String,
    /// Content encryption algorithm (`enc`).
    pub encryption: String,
    /// `zip` code; `None` leaves the payload uncompressed.
    pub compression: Option<String>,
    pub source: KeySource,
    /// `apu`/`apv` for ECDH-ES.
    pub party: PartyInfo,
}

impl EncryptingCredentials {
    pub fn new(
        algorithm: impl Into<String>,
        encryption: impl Into<String>,
        key: Arc<SecretKey>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            encryption: encryption.into(),
            compression: None,
            source: KeySource::Key(key),
            party: PartyInfo::default(),
        }
    }

    pub fn from_collection(
        algorithm: impl Into<String>,
        encryption: impl Into<String>,
        keys: SecretKeyCollection,
        kid: Option<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            encryption: encryption.into(),
            compression: None,
            source: KeySource::Collection { keys, kid },
            party: PartyInfo::default(),
        }
    }

    pub fn with_compression(mut self, code: impl Into<String>) -> Self {
        self.compression = Some(code.into());
        self
    }

    pub fn with_party_info(mut self, party: PartyInfo) -> Self {
        self.party = party;
        self
    }
}

/// Signing, encryption, or both (sign first, then encrypt the JWS).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub signing: Option<SigningCredentials>,
    pub encrypting: Option<EncryptingCredentials>,
}

impl Credentials {
    pub fn signed(signing: SigningCredentials) -> Self {
        Self {
            signing: Some(signing),
            encrypting: None,
        }
    }

    pub fn encrypted(encrypting: EncryptingCredentials) -> Self {
        Self {
            signing: None,
            encrypting: Some(encrypting),
        }
    }

    pub fn nested(signing: SigningCredentials, encrypting: EncryptingCredentials) -> Self {
        Self {
            signing: Some(signing),
            encrypting: Some(encrypting),
        }
    }
}

impl From<SigningCredentials> for Credentials {
    fn from(signing: SigningCredentials) -> Self {
        Self::signed(signing)
    }
}

impl From<EncryptingCredentials> for Credentials {
    fn from(encrypting: EncryptingCredentials) -> Self {
        Self::encrypted(encrypting)
    }
}
