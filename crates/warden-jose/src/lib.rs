//! Compact JWS and JWE serialization (RFC 7515 / RFC 7516).
//!
//! - `Header`: insertion-ordered JOSE header with typed accessors
//! - `CompactToken`: segment split, 3 segments for JWS and 5 for JWE
//! - `Credentials`: signing and/or encrypting algorithm plus key source
//! - `JoseSerializer`: encode, decode with candidate keys, nested tokens
//!
//! Keys, algorithms and providers come from `warden-crypto`.

mod compact;
mod credentials;
mod error;
mod header;
mod options;
mod serializer;

pub use compact::{CompactToken, JweParts, JwsParts};
pub use credentials::{Credentials, EncryptingCredentials, KeySource, SigningCredentials};
pub use error::JoseError;
pub use header::Header;
pub use options::{SerializerOptions, DEFAULT_MAX_TOKEN_LENGTH};
pub use serializer::{DecodedToken, JoseSerializer};

pub use warden_crypto;
