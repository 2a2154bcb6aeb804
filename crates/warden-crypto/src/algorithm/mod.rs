//! Algorithm descriptors: wire code, accepted key type, legal key sizes, and
//! the family-specific parameters a provider needs.

mod catalog;
mod registry;

pub use catalog::builtin_descriptors;
pub use registry::{AlgorithmCollection, AlgorithmRegistry};

use crate::source::Disposable;

/// Hash function used by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Digest size in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }
}

/// Elliptic curves supported for ECDSA and ECDH-ES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// JWK `crv` value.
    pub fn jwk_name(self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
        }
    }

    pub fn from_jwk_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(EcCurve::P256),
            "P-384" => Some(EcCurve::P384),
            _ => None,
        }
    }

    pub fn from_bits(bits: usize) -> Option<Self> {
        match bits {
            256 => Some(EcCurve::P256),
            384 => Some(EcCurve::P384),
            _ => None,
        }
    }

    pub fn bits(self) -> usize {
        match self {
            EcCurve::P256 => 256,
            EcCurve::P384 => 384,
        }
    }

    /// Length of one affine coordinate (and of the private scalar).
    pub fn coordinate_len(self) -> usize {
        self.bits() / 8
    }
}

/// Which kind of secret key a descriptor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    None,
    Symmetric,
    Rsa,
    Ecc,
    /// Certificate-backed RSA or EC key. Resolution matches on the wrapped key.
    Certificate,
}

impl KeyType {
    pub fn name(self) -> &'static str {
        match self {
            KeyType::None => "none",
            KeyType::Symmetric => "symmetric",
            KeyType::Rsa => "rsa",
            KeyType::Ecc => "ecc",
            KeyType::Certificate => "certificate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(KeyType::None),
            "symmetric" => Some(KeyType::Symmetric),
            "rsa" => Some(KeyType::Rsa),
            "ecc" => Some(KeyType::Ecc),
            "certificate" => Some(KeyType::Certificate),
            _ => None,
        }
    }
}

/// An inclusive range of legal key sizes in bits.
///
/// `step == 0` means the range holds exactly `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySizes {
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

impl KeySizes {
    pub const fn exact(bits: usize) -> Self {
        Self {
            min: bits,
            max: bits,
            step: 0,
        }
    }

    pub const fn range(min: usize, max: usize, step: usize) -> Self {
        Self { min, max, step }
    }

    pub fn contains(&self, bits: usize) -> bool {
        if bits < self.min || bits > self.max {
            return false;
        }
        if self.step == 0 {
            return bits == self.min;
        }
        (bits - self.min) % self.step == 0
    }
}

/// Algorithm family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    Signature,
    AuthenticatedEncryption,
    KeyManagement,
    Compression,
}

impl AlgorithmFamily {
    pub fn name(self) -> &'static str {
        match self {
            AlgorithmFamily::Signature => "signature",
            AlgorithmFamily::AuthenticatedEncryption => "authenticated encryption",
            AlgorithmFamily::KeyManagement => "key management",
            AlgorithmFamily::Compression => "compression",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// Unsecured; zero-length signature.
    None,
    Hmac(HashAlg),
    RsaPkcs1(HashAlg),
    RsaPss(HashAlg),
    Ecdsa(EcCurve),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadKind {
    AesGcm { key_bits: usize },
    /// AES-CBC + HMAC composite (RFC 7518 §5.2). `key_bits` covers both halves.
    AesCbcHmac { key_bits: usize, hash: HashAlg },
}

impl AeadKind {
    pub fn key_len(self) -> usize {
        match self {
            AeadKind::AesGcm { key_bits } | AeadKind::AesCbcHmac { key_bits, .. } => key_bits / 8,
        }
    }

    pub fn iv_size(self) -> usize {
        match self {
            AeadKind::AesGcm { .. } => 12,
            AeadKind::AesCbcHmac { .. } => 16,
        }
    }

    pub fn tag_size(self) -> usize {
        match self {
            AeadKind::AesGcm { .. } => 16,
            // The tag is the first half of the HMAC output, as long as the MAC key.
            AeadKind::AesCbcHmac { key_bits, .. } => key_bits / 16,
        }
    }

    /// Ciphertext length for a plaintext of `plaintext_len` bytes.
    pub fn ciphertext_length(self, plaintext_len: usize) -> usize {
        match self {
            AeadKind::AesGcm { .. } => plaintext_len,
            // PKCS#7 always adds at least one byte of padding.
            AeadKind::AesCbcHmac { .. } => (plaintext_len / 16 + 1) * 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWrapKind {
    /// The key itself is the CEK.
    Direct,
    AesKw { kek_bits: usize },
    AesGcmKw { kek_bits: usize },
    /// ECDH-ES; `wrap_bits == None` is direct key agreement.
    EcdhEs { wrap_bits: Option<usize> },
    Pbes2 { hash: HashAlg, wrap_bits: usize },
    RsaOaep(HashAlg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Deflate,
}

/// Family-specific parameters; the variant is the family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmParams {
    Signature(SignatureKind),
    AuthenticatedEncryption(AeadKind),
    KeyManagement(KeyWrapKind),
    Compression(CompressionKind),
}

/// Static metadata describing one algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    code: String,
    key_type: KeyType,
    legal_key_sizes: Vec<KeySizes>,
    default_key_size: usize,
    params: AlgorithmParams,
}

impl AlgorithmDescriptor {
    pub fn new(
        code: impl Into<String>,
        key_type: KeyType,
        legal_key_sizes: Vec<KeySizes>,
        default_key_size: usize,
        params: AlgorithmParams,
    ) -> Self {
        Self {
            code: code.into(),
            key_type,
            legal_key_sizes,
            default_key_size,
            params,
        }
    }

    /// Wire identifier, e.g. `"RS256"`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn legal_key_sizes(&self) -> &[KeySizes] {
        &self.legal_key_sizes
    }

    pub fn default_key_size(&self) -> usize {
        self.default_key_size
    }

    pub fn params(&self) -> AlgorithmParams {
        self.params
    }

    pub fn family(&self) -> AlgorithmFamily {
        match self.params {
            AlgorithmParams::Signature(_) => AlgorithmFamily::Signature,
            AlgorithmParams::AuthenticatedEncryption(_) => AlgorithmFamily::AuthenticatedEncryption,
            AlgorithmParams::KeyManagement(_) => AlgorithmFamily::KeyManagement,
            AlgorithmParams::Compression(_) => AlgorithmFamily::Compression,
        }
    }

    /// An empty size list accepts any length.
    pub fn is_legal_key_size(&self, bits: usize) -> bool {
        self.legal_key_sizes.is_empty() || self.legal_key_sizes.iter().any(|s| s.contains(bits))
    }

    pub fn accepts_key_type(&self, key_type: KeyType) -> bool {
        self.key_type == key_type
    }
}

impl Disposable for AlgorithmDescriptor {
    fn dispose(&self) {}
}
