//! Cryptographic core of the warden JOSE engine.
//!
//! - Base64URL codec and a zeroizing buffer pool
//! - Secret keys (symmetric, RSA, EC, certificate-backed) with explicit disposal
//! - Key and algorithm collections built from data sources with change tokens
//! - Algorithm descriptors and the built-in RFC 7518 catalog
//! - Factories and providers for signatures, content encryption, key
//!   management and compression
//!
//! Compact serialization lives in `warden-jose`.

pub mod algorithm;
pub mod base64url;
pub mod error;
pub mod key;
pub mod memory;
pub mod provider;
pub mod resolve;
pub mod source;

pub use algorithm::{
    AeadKind, AlgorithmCollection, AlgorithmDescriptor, AlgorithmFamily, AlgorithmParams,
    AlgorithmRegistry, CompressionKind, EcCurve, HashAlg, KeySizes, KeyType, KeyWrapKind,
    SignatureKind,
};
pub use base64url::{
    base64url_decode, base64url_decode_into, base64url_encode, base64url_encode_into,
};
pub use error::{CryptoError, ErrorKind};
pub use key::{
    deserialize_record, serialize_record, ImportedSecret, Jwk, KeyMaterial, KeyMetadata, KeyUsage,
    SecretKey, SecretKeyCollection, SecretRecord,
};
pub use memory::{Rental, SecurePool};
pub use provider::{
    AeadFactory, AeadOutput, AeadProvider, CompressionFactory, CompressionProvider, CryptoFactory,
    KeyWrapFactory, KeyWrapProvider, PartyInfo, SignatureFactory, SignatureProvider,
    WrapParameters, WrappedKey,
};
pub use resolve::{KeySelector, ProviderResolver, Purpose};
pub use source::{
    ChangeToken, Collection, CollectionBuilder, DataSource, Disposable, DynamicSource, Snapshot,
    StaticSource,
};
