//! Built-in algorithm descriptors (RFC 7518 codes plus RFC 7516 `DEF`).

use std::sync::Arc;

use super::{
    AeadKind, AlgorithmDescriptor, AlgorithmParams, CompressionKind, EcCurve, HashAlg, KeySizes,
    KeyType, KeyWrapKind, SignatureKind,
};

const RSA_SIZES: KeySizes = KeySizes::range(2048, 16384, 8);
const RSA_DEFAULT_BITS: usize = 2048;
const MAX_HMAC_KEY_BITS: usize = 8192;

fn entry(
    code: &str,
    key_type: KeyType,
    sizes: Vec<KeySizes>,
    default_bits: usize,
    params: AlgorithmParams,
) -> Arc<AlgorithmDescriptor> {
    Arc::new(AlgorithmDescriptor::new(
        code,
        key_type,
        sizes,
        default_bits,
        params,
    ))
}

fn signatures() -> Vec<Arc<AlgorithmDescriptor>> {
    let mut out = vec![entry(
        "none",
        KeyType::None,
        vec![KeySizes::exact(0)],
        0,
        AlgorithmParams::Signature(SignatureKind::None),
    )];

    for (code, hash) in [
        ("HS256", HashAlg::Sha256),
        ("HS384", HashAlg::Sha384),
        ("HS512", HashAlg::Sha512),
    ] {
        // HMAC keys must be at least as long as the hash output.
        let min = hash.output_len() * 8;
        out.push(entry(
            code,
            KeyType::Symmetric,
            vec![KeySizes::range(min, MAX_HMAC_KEY_BITS, 8)],
            min,
            AlgorithmParams::Signature(SignatureKind::Hmac(hash)),
        ));
    }

    for (code, kind) in [
        ("RS256", SignatureKind::RsaPkcs1(HashAlg::Sha256)),
        ("RS384", SignatureKind::RsaPkcs1(HashAlg::Sha384)),
        ("RS512", SignatureKind::RsaPkcs1(HashAlg::Sha512)),
        ("PS256", SignatureKind::RsaPss(HashAlg::Sha256)),
        ("PS384", SignatureKind::RsaPss(HashAlg::Sha384)),
        ("PS512", SignatureKind::RsaPss(HashAlg::Sha512)),
    ] {
        out.push(entry(
            code,
            KeyType::Rsa,
            vec![RSA_SIZES],
            RSA_DEFAULT_BITS,
            AlgorithmParams::Signature(kind),
        ));
    }

    for (code, curve) in [("ES256", EcCurve::P256), ("ES384", EcCurve::P384)] {
        out.push(entry(
            code,
            KeyType::Ecc,
            vec![KeySizes::exact(curve.bits())],
            curve.bits(),
            AlgorithmParams::Signature(SignatureKind::Ecdsa(curve)),
        ));
    }

    out
}

fn content_encryption() -> Vec<Arc<AlgorithmDescriptor>> {
    let mut out = Vec::new();
    for (code, key_bits) in [("A128GCM", 128), ("A192GCM", 192), ("A256GCM", 256)] {
        out.push(entry(
            code,
            KeyType::Symmetric,
            vec![KeySizes::exact(key_bits)],
            key_bits,
            AlgorithmParams::AuthenticatedEncryption(AeadKind::AesGcm { key_bits }),
        ));
    }
    for (code, key_bits, hash) in [
        ("A128CBC-HS256", 256, HashAlg::Sha256),
        ("A192CBC-HS384", 384, HashAlg::Sha384),
        ("A256CBC-HS512", 512, HashAlg::Sha512),
    ] {
        out.push(entry(
            code,
            KeyType::Symmetric,
            vec![KeySizes::exact(key_bits)],
            key_bits,
            AlgorithmParams::AuthenticatedEncryption(AeadKind::AesCbcHmac { key_bits, hash }),
        ));
    }
    out
}

fn key_management() -> Vec<Arc<AlgorithmDescriptor>> {
    use KeyWrapKind::*;

    // The CEK used by `dir` is checked against the content encryption
    // descriptor instead.
    let mut out = vec![entry(
        "dir",
        KeyType::Symmetric,
        Vec::new(),
        256,
        AlgorithmParams::KeyManagement(Direct),
    )];

    for (code, kek_bits) in [("A128KW", 128), ("A192KW", 192), ("A256KW", 256)] {
        out.push(entry(
            code,
            KeyType::Symmetric,
            vec![KeySizes::exact(kek_bits)],
            kek_bits,
            AlgorithmParams::KeyManagement(AesKw { kek_bits }),
        ));
    }

    for (code, kek_bits) in [("A128GCMKW", 128), ("A192GCMKW", 192), ("A256GCMKW", 256)] {
        out.push(entry(
            code,
            KeyType::Symmetric,
            vec![KeySizes::exact(kek_bits)],
            kek_bits,
            AlgorithmParams::KeyManagement(AesGcmKw { kek_bits }),
        ));
    }

    for (code, wrap_bits) in [
        ("ECDH-ES", None),
        ("ECDH-ES+A128KW", Some(128)),
        ("ECDH-ES+A192KW", Some(192)),
        ("ECDH-ES+A256KW", Some(256)),
    ] {
        out.push(entry(
            code,
            KeyType::Ecc,
            vec![KeySizes::exact(256), KeySizes::exact(384)],
            256,
            AlgorithmParams::KeyManagement(EcdhEs { wrap_bits }),
        ));
    }

    for (code, hash, wrap_bits) in [
        ("PBES2-HS256+A128KW", HashAlg::Sha256, 128),
        ("PBES2-HS384+A192KW", HashAlg::Sha384, 192),
        ("PBES2-HS512+A256KW", HashAlg::Sha512, 256),
    ] {
        out.push(entry(
            code,
            KeyType::Symmetric,
            vec![KeySizes::range(8, 8192, 8)],
            256,
            AlgorithmParams::KeyManagement(Pbes2 { hash, wrap_bits }),
        ));
    }

    out.push(entry(
        "RSA-OAEP-256",
        KeyType::Rsa,
        vec![RSA_SIZES],
        RSA_DEFAULT_BITS,
        AlgorithmParams::KeyManagement(RsaOaep(HashAlg::Sha256)),
    ));

    out
}

fn compression() -> Vec<Arc<AlgorithmDescriptor>> {
    vec![
        entry(
            "none",
            KeyType::None,
            vec![KeySizes::exact(0)],
            0,
            AlgorithmParams::Compression(CompressionKind::None),
        ),
        entry(
            "DEF",
            KeyType::None,
            vec![KeySizes::exact(0)],
            0,
            AlgorithmParams::Compression(CompressionKind::Deflate),
        ),
    ]
}

/// Every descriptor the engine ships with.
pub fn builtin_descriptors() -> Vec<Arc<AlgorithmDescriptor>> {
    let mut all = signatures();
    all.extend(content_encryption());
    all.extend(key_management());
    all.extend(compression());
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmFamily;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_within_a_family() {
        let mut seen = HashSet::new();
        for d in builtin_descriptors() {
            assert!(
                seen.insert((d.family(), d.code().to_string())),
                "duplicate {}",
                d.code()
            );
        }
    }

    #[test]
    fn default_sizes_are_legal() {
        for d in builtin_descriptors() {
            assert!(
                d.is_legal_key_size(d.default_key_size()),
                "{} default {}",
                d.code(),
                d.default_key_size()
            );
        }
    }

    #[test]
    fn none_exists_in_two_families() {
        let families: Vec<AlgorithmFamily> = builtin_descriptors()
            .iter()
            .filter(|d| d.code() == "none")
            .map(|d| d.family())
            .collect();
        assert_eq!(
            families,
            vec![AlgorithmFamily::Signature, AlgorithmFamily::Compression]
        );
    }
}
