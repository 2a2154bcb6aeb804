//! End-to-end tests for `JoseSerializer` encode / decode.

use std::sync::Arc;

use serde_json::json;
use warden_crypto::{
    base64url_decode, base64url_encode, AlgorithmFamily, AlgorithmRegistry, Collection,
    ErrorKind, KeyMaterial, KeyMetadata, PartyInfo, SecretKey, SecretKeyCollection,
};
use warden_jose::{
    Credentials, EncryptingCredentials, Header, JoseError, JoseSerializer, SerializerOptions,
    SigningCredentials,
};

// ============================================================================
// Helpers
// ============================================================================

const RSA_PEM: &str = include_str!("../../warden-crypto/testdata/rsa2048.pem");
const RSA_ALT_PEM: &str = include_str!("../../warden-crypto/testdata/rsa2048-alt.pem");

fn fast_serializer() -> JoseSerializer {
    let options = SerializerOptions {
        pbes2_iterations: 1_000,
        ..SerializerOptions::default()
    };
    JoseSerializer::new(AlgorithmRegistry::builtin(), options)
}

fn generate(kid: &str, family: AlgorithmFamily, code: &str) -> Arc<SecretKey> {
    let descriptor = AlgorithmRegistry::builtin().find(family, code).unwrap();
    Arc::new(SecretKey::generate(Some(kid.to_string()), &descriptor, None).unwrap())
}

fn symmetric(kid: &str, bytes: &[u8]) -> Arc<SecretKey> {
    Arc::new(SecretKey::symmetric(kid, bytes))
}

fn anonymous(bytes: &[u8]) -> Arc<SecretKey> {
    Arc::new(SecretKey::new(
        None,
        KeyMaterial::symmetric(bytes),
        KeyMetadata::default(),
    ))
}

fn rsa(kid: &str, pem: &str) -> Arc<SecretKey> {
    Arc::new(SecretKey::from_pkcs8_pem(Some(kid.to_string()), pem).unwrap())
}

fn collection(keys: Vec<Arc<SecretKey>>) -> SecretKeyCollection {
    Collection::from_items(keys, false)
}

fn segments(token: &str) -> Vec<&str> {
    token.split('.').collect()
}

/// Flip one bit inside segment `index`, keeping the segment valid Base64URL.
fn flip_bit(token: &str, index: usize) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let mut bytes = base64url_decode(&parts[index]).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x01;
    parts[index] = base64url_encode(&bytes);
    parts.join(".")
}

fn sign(serializer: &JoseSerializer, alg: &str, key: &Arc<SecretKey>, payload: &[u8]) -> String {
    let credentials = Credentials::signed(SigningCredentials::new(alg, key.clone()));
    serializer.encode(payload, &credentials, None).unwrap()
}

fn encrypt(
    serializer: &JoseSerializer,
    alg: &str,
    enc: &str,
    key: &Arc<SecretKey>,
    payload: &[u8],
) -> String {
    let credentials = Credentials::encrypted(EncryptingCredentials::new(alg, enc, key.clone()));
    serializer.encode(payload, &credentials, None).unwrap()
}

fn assert_integrity(result: Result<warden_jose::DecodedToken, JoseError>) {
    match result {
        Err(JoseError::Integrity) => {}
        other => panic!("expected integrity failure, got {:?}", other),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn hs256_token_has_32_byte_signature_and_rejects_flipped_key() {
    let serializer = JoseSerializer::default();
    let key_bytes = [0x5a; 32];
    let key = symmetric("hmac", &key_bytes);

    let token = sign(&serializer, "HS256", &key, br#"{"sub":"abc"}"#);
    let parts = segments(&token);
    assert_eq!(parts.len(), 3);
    assert_eq!(base64url_decode(parts[2]).unwrap().len(), 32);

    let decoded = serializer.decode_with_keys(&token, &[key]).unwrap();
    assert_eq!(decoded.payload, br#"{"sub":"abc"}"#);
    assert_eq!(decoded.key_id.as_deref(), Some("hmac"));

    let mut flipped = key_bytes;
    flipped[0] ^= 0x01;
    assert_integrity(serializer.decode_with_keys(&token, &[symmetric("hmac", &flipped)]));
}

#[test]
fn a256gcm_direct_token_shape_and_iv_swap() {
    let serializer = JoseSerializer::default();
    let key = symmetric("cek", &[0x17; 32]);
    let payload = [0xab; 100];

    let token = encrypt(&serializer, "dir", "A256GCM", &key, &payload);
    let parts = segments(&token);
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[1], "");
    assert_eq!(base64url_decode(parts[2]).unwrap().len(), 12);
    assert_eq!(base64url_decode(parts[4]).unwrap().len(), 16);

    let decoded = serializer.decode_with_keys(&token, &[key.clone()]).unwrap();
    assert_eq!(decoded.payload, payload);

    let other = encrypt(&serializer, "dir", "A256GCM", &key, &payload);
    let mut swapped = parts.clone();
    swapped[2] = segments(&other)[2];
    assert_ne!(swapped[2], parts[2]);
    assert_integrity(serializer.decode_with_keys(&swapped.join("."), &[key]));
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn signature_algorithms_round_trip() {
    let serializer = JoseSerializer::default();
    let rsa_key = rsa("rsa", RSA_PEM);
    let mut cases: Vec<(&str, Arc<SecretKey>)> = Vec::new();
    for alg in ["HS256", "HS384", "HS512", "ES256", "ES384"] {
        cases.push((alg, generate(alg, AlgorithmFamily::Signature, alg)));
    }
    for alg in ["RS256", "RS384", "RS512", "PS256", "PS384", "PS512"] {
        cases.push((alg, rsa_key.clone()));
    }

    for (alg, key) in cases {
        for payload in [&b""[..], b"x", br#"{"sub":"abc","n":[1,2,3]}"#] {
            let token = sign(&serializer, alg, &key, payload);
            let decoded = serializer
                .decode_with_keys(&token, &[key.clone()])
                .unwrap_or_else(|e| panic!("{alg}: {e}"));
            assert_eq!(decoded.payload, payload, "{alg}");
            assert_eq!(decoded.header.alg(), Some(alg));
        }
    }
}

#[test]
fn ecdsa_signatures_are_fixed_width() {
    let serializer = JoseSerializer::default();
    for (alg, width) in [("ES256", 64), ("ES384", 96)] {
        let key = generate(alg, AlgorithmFamily::Signature, alg);
        let token = sign(&serializer, alg, &key, b"payload");
        assert_eq!(base64url_decode(segments(&token)[2]).unwrap().len(), width);
    }
}

#[test]
fn content_encryption_algorithms_round_trip() {
    let serializer = JoseSerializer::default();
    for (enc, key_len) in [
        ("A128GCM", 16),
        ("A192GCM", 24),
        ("A256GCM", 32),
        ("A128CBC-HS256", 32),
        ("A192CBC-HS384", 48),
        ("A256CBC-HS512", 64),
    ] {
        let key = symmetric("dir", &vec![0x33; key_len]);
        for payload in [&b""[..], b"short", &[0u8; 1000][..]] {
            let token = encrypt(&serializer, "dir", enc, &key, payload);
            let decoded = serializer
                .decode_with_keys(&token, &[key.clone()])
                .unwrap_or_else(|e| panic!("{enc}: {e}"));
            assert_eq!(decoded.payload, payload, "{enc}");
            assert_eq!(decoded.header.enc(), Some(enc));
        }
    }
}

#[test]
fn key_management_algorithms_round_trip() {
    let serializer = fast_serializer();
    let password = symmetric("pw", b"correct horse battery staple");
    let mut cases: Vec<(&str, Arc<SecretKey>)> = vec![
        ("RSA-OAEP-256", rsa("rsa", RSA_PEM)),
        ("PBES2-HS256+A128KW", password.clone()),
        ("PBES2-HS384+A192KW", password.clone()),
        ("PBES2-HS512+A256KW", password),
    ];
    for alg in [
        "A128KW",
        "A192KW",
        "A256KW",
        "A128GCMKW",
        "A192GCMKW",
        "A256GCMKW",
        "ECDH-ES",
        "ECDH-ES+A128KW",
        "ECDH-ES+A192KW",
        "ECDH-ES+A256KW",
    ] {
        cases.push((alg, generate(alg, AlgorithmFamily::KeyManagement, alg)));
    }

    for (alg, key) in cases {
        for enc in ["A128GCM", "A256CBC-HS512"] {
            let token = encrypt(&serializer, alg, enc, &key, b"the payload");
            let decoded = serializer
                .decode_with_keys(&token, &[key.clone()])
                .unwrap_or_else(|e| panic!("{alg}/{enc}: {e}"));
            assert_eq!(decoded.payload, b"the payload", "{alg}/{enc}");
            assert_eq!(decoded.header.alg(), Some(alg));
        }
    }
}

#[test]
fn wrap_parameters_appear_in_header() {
    let serializer = fast_serializer();

    let gcm_key = generate("gcm", AlgorithmFamily::KeyManagement, "A128GCMKW");
    let token = encrypt(&serializer, "A128GCMKW", "A128GCM", &gcm_key, b"x");
    let header = Header::from_segment(segments(&token)[0]).unwrap();
    assert!(header.contains("iv") && header.contains("tag"));

    let pw = symmetric("pw", b"secret password");
    let token = encrypt(&serializer, "PBES2-HS256+A128KW", "A128GCM", &pw, b"x");
    let header = Header::from_segment(segments(&token)[0]).unwrap();
    assert_eq!(header.get("p2c"), Some(&json!(1_000)));
    assert_eq!(base64url_decode(header.get_str("p2s").unwrap()).unwrap().len(), 16);

    let ec = generate("ec", AlgorithmFamily::KeyManagement, "ECDH-ES");
    let token = encrypt(&serializer, "ECDH-ES", "A256GCM", &ec, b"x");
    let header = Header::from_segment(segments(&token)[0]).unwrap();
    assert_eq!(header.get("epk").unwrap()["kty"], "EC");
    assert!(header.get("epk").unwrap().get("d").is_none());
    assert_eq!(segments(&token)[1], "");
}

#[test]
fn ecdh_party_info_is_bound_into_the_key() {
    let serializer = JoseSerializer::default();
    let key = generate("ec", AlgorithmFamily::KeyManagement, "ECDH-ES+A128KW");
    let party = PartyInfo {
        apu: b"Alice".to_vec(),
        apv: b"Bob".to_vec(),
    };
    let credentials = Credentials::encrypted(
        EncryptingCredentials::new("ECDH-ES+A128KW", "A128GCM", key.clone())
            .with_party_info(party),
    );
    let token = serializer.encode(b"agreed", &credentials, None).unwrap();
    let header = Header::from_segment(segments(&token)[0]).unwrap();
    assert_eq!(header.get_str("apu"), Some("QWxpY2U"));
    assert_eq!(header.get_str("apv"), Some("Qm9i"));
    assert_eq!(
        serializer.decode_with_keys(&token, &[key.clone()]).unwrap().payload,
        b"agreed"
    );

    // Rewrite apv: the derived KEK changes and unwrap fails.
    let mut tampered = header.clone();
    tampered.insert("apv", base64url_encode(b"Mallory"));
    let segment = tampered.to_segment().unwrap();
    let mut parts = segments(&token);
    parts[0] = &segment;
    assert_integrity(serializer.decode_with_keys(&parts.join("."), &[key]));
}

#[test]
fn compressed_payload_round_trips() {
    let serializer = JoseSerializer::default();
    let key = symmetric("k", &[9; 16]);
    let payload = "all work and no play ".repeat(200);

    let credentials = Credentials::encrypted(
        EncryptingCredentials::new("A128KW", "A128GCM", key.clone()).with_compression("DEF"),
    );
    let token = serializer.encode(payload.as_bytes(), &credentials, None).unwrap();
    assert_eq!(Header::from_segment(segments(&token)[0]).unwrap().zip(), Some("DEF"));
    assert!(base64url_decode(segments(&token)[3]).unwrap().len() < payload.len() / 4);

    let decoded = serializer.decode_with_keys(&token, &[key]).unwrap();
    assert_eq!(decoded.payload_str().unwrap(), payload);
}

#[test]
fn identity_compression_adds_no_zip_header() {
    let serializer = JoseSerializer::default();
    let key = symmetric("k", &[9; 16]);
    let credentials = Credentials::encrypted(
        EncryptingCredentials::new("A128KW", "A128GCM", key).with_compression("none"),
    );
    let token = serializer.encode(b"plain", &credentials, None).unwrap();
    assert_eq!(Header::from_segment(segments(&token)[0]).unwrap().zip(), None);
}

#[test]
fn decompression_limit_is_a_format_error() {
    let options = SerializerOptions {
        max_decompressed_size: 1024,
        ..SerializerOptions::default()
    };
    let serializer = JoseSerializer::new(AlgorithmRegistry::builtin(), options);
    let key = symmetric("k", &[9; 16]);
    let credentials = Credentials::encrypted(
        EncryptingCredentials::new("A128KW", "A128GCM", key.clone()).with_compression("DEF"),
    );
    let token = serializer.encode(&[b'a'; 4096], &credentials, None).unwrap();
    let err = serializer.decode_with_keys(&token, &[key]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

// ============================================================================
// Nested and unsecured tokens
// ============================================================================

#[test]
fn nested_token_is_signed_then_encrypted() {
    let serializer = JoseSerializer::default();
    let signing_key = symmetric("sig", &[1; 32]);
    let encryption_key = symmetric("enc", &[2; 32]);
    let credentials = Credentials::nested(
        SigningCredentials::new("HS256", signing_key.clone()),
        EncryptingCredentials::new("A256KW", "A256GCM", encryption_key.clone()),
    );
    let extra = Header::new().with("typ", "JWT");
    let token = serializer
        .encode(br#"{"sub":"abc"}"#, &credentials, Some(&extra))
        .unwrap();
    assert_eq!(segments(&token).len(), 5);

    let keys = [signing_key, encryption_key];
    let decoded = serializer.decode_with_keys(&token, &keys).unwrap();
    assert!(decoded.is_nested());
    assert_eq!(decoded.payload, br#"{"sub":"abc"}"#);
    assert_eq!(decoded.header.alg(), Some("HS256"));
    assert_eq!(decoded.header.typ(), Some("JWT"));
    assert_eq!(decoded.key_id.as_deref(), Some("sig"));
    let outer = decoded.outer_header.unwrap();
    assert_eq!(outer.cty(), Some("JWT"));
    assert_eq!(outer.typ(), None);
}

#[test]
fn nested_unwrapping_can_be_disabled() {
    let options = SerializerOptions {
        unwrap_nested: false,
        ..SerializerOptions::default()
    };
    let serializer = JoseSerializer::new(AlgorithmRegistry::builtin(), options);
    let signing_key = symmetric("sig", &[1; 32]);
    let encryption_key = symmetric("enc", &[2; 16]);
    let credentials = Credentials::nested(
        SigningCredentials::new("HS256", signing_key.clone()),
        EncryptingCredentials::new("dir", "A128GCM", encryption_key.clone()),
    );
    let token = serializer.encode(b"inner", &credentials, None).unwrap();

    let decoded = serializer.decode_with_keys(&token, &[encryption_key]).unwrap();
    assert!(!decoded.is_nested());
    let inner = decoded.payload_str().unwrap();
    assert_eq!(segments(inner).len(), 3);
    let inner = serializer.decode_with_keys(inner, &[signing_key]).unwrap();
    assert_eq!(inner.payload, b"inner");
}

#[test]
fn unsecured_tokens_need_opt_in() {
    let serializer = JoseSerializer::default();
    let credentials = Credentials::signed(SigningCredentials::unsecured());
    let token = serializer.encode(b"open", &credentials, None).unwrap();
    assert!(token.ends_with('.'));
    assert_eq!(segments(&token).len(), 3);

    let err = serializer.decode_with_keys(&token, &[]).unwrap_err();
    assert!(matches!(err, JoseError::UnsecuredTokenRejected));

    let permissive = JoseSerializer::new(
        AlgorithmRegistry::builtin(),
        SerializerOptions {
            allow_unsecured: true,
            ..SerializerOptions::default()
        },
    );
    assert_eq!(permissive.decode_with_keys(&token, &[]).unwrap().payload, b"open");

    // A signature on an unsecured token is never accepted.
    let signed = format!("{}c2ln", token);
    assert_integrity(permissive.decode_with_keys(&signed, &[]));
}

// ============================================================================
// Tamper detection
// ============================================================================

#[test]
fn flipped_signature_bit_fails_integrity() {
    let serializer = JoseSerializer::default();
    let rsa_key = rsa("rsa", RSA_PEM);
    let cases = [
        ("HS256", symmetric("h", &[4; 32])),
        ("ES256", generate("e", AlgorithmFamily::Signature, "ES256")),
        ("RS256", rsa_key.clone()),
        ("PS256", rsa_key),
    ];
    for (alg, key) in cases {
        let token = sign(&serializer, alg, &key, b"payload");
        assert_integrity(serializer.decode_with_keys(&flip_bit(&token, 2), &[key.clone()]));
        assert_integrity(serializer.decode_with_keys(&flip_bit(&token, 1), &[key]));
    }
}

#[test]
fn flipped_jwe_bits_fail_integrity() {
    let serializer = JoseSerializer::default();
    for (alg, enc, key) in [
        ("dir", "A128GCM", symmetric("d", &[5; 16])),
        ("dir", "A128CBC-HS256", symmetric("d", &[5; 32])),
        ("A128KW", "A256GCM", symmetric("w", &[6; 16])),
    ] {
        let token = encrypt(&serializer, alg, enc, &key, b"payload bytes");
        for segment in [3, 4] {
            let tampered = flip_bit(&token, segment);
            assert_integrity(serializer.decode_with_keys(&tampered, &[key.clone()]));
        }
    }
}

#[test]
fn rsa_oaep_with_wrong_key_fails_integrity() {
    let serializer = JoseSerializer::default();
    let token = encrypt(&serializer, "RSA-OAEP-256", "A128GCM", &rsa("r", RSA_PEM), b"x");
    assert_integrity(serializer.decode_with_keys(&token, &[rsa("r", RSA_ALT_PEM)]));
}

// ============================================================================
// Resolution errors
// ============================================================================

#[test]
fn unknown_algorithms_are_reported() {
    let serializer = JoseSerializer::default();
    let key = symmetric("k", &[1; 32]);

    let credentials = Credentials::signed(SigningCredentials::new("HS999", key.clone()));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm);

    let credentials =
        Credentials::encrypted(EncryptingCredentials::new("dir", "A512GCM", key.clone()));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm);

    // A signature code is not a key management algorithm.
    let credentials =
        Credentials::encrypted(EncryptingCredentials::new("HS256", "A256GCM", key.clone()));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm);

    let header = Header::new().with("alg", "XS256").to_segment().unwrap();
    let err = serializer
        .decode_with_keys(&format!("{}.eA.c2ln", header), &[key.clone()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm);

    let token = encrypt(&serializer, "dir", "A256GCM", &key, b"x");
    let mut header = Header::from_segment(segments(&token)[0]).unwrap();
    header.insert("zip", "LZW");
    let segment = header.to_segment().unwrap();
    let mut parts = segments(&token);
    parts[0] = &segment;
    let err = serializer.decode_with_keys(&parts.join("."), &[key]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm);
}

#[test]
fn illegal_key_sizes_are_rejected() {
    let serializer = JoseSerializer::default();
    let short = symmetric("k", &[1; 16]);

    let credentials = Credentials::signed(SigningCredentials::new("HS256", short.clone()));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeySize);

    let credentials =
        Credentials::encrypted(EncryptingCredentials::new("dir", "A256GCM", short.clone()));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeySize);

    let credentials =
        Credentials::encrypted(EncryptingCredentials::new("A256KW", "A256GCM", short.clone()));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeySize);

    // Decoding with only an undersized key reports the size, not integrity.
    let token = sign(&serializer, "HS256", &symmetric("k", &[1; 32]), b"x");
    let err = serializer.decode_with_keys(&token, &[short]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeySize);
}

#[test]
fn disposed_keys_and_collections_fail() {
    let serializer = JoseSerializer::default();
    let key = symmetric("k", &[3; 32]);
    let token = sign(&serializer, "HS256", &key, b"x");

    let keys = collection(vec![key.clone()]);
    assert!(serializer.try_decode(&token, &keys).is_ok());
    keys.dispose();
    assert_eq!(
        serializer.try_decode(&token, &keys).unwrap_err().kind(),
        ErrorKind::Disposed
    );

    key.dispose();
    let credentials = Credentials::signed(SigningCredentials::new("HS256", key));
    let err = serializer.encode(b"x", &credentials, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disposed);
}

#[test]
fn malformed_tokens_are_format_errors() {
    let serializer = JoseSerializer::default();
    let key = symmetric("k", &[3; 32]);
    let no_alg = Header::new().with("kid", "k").to_segment().unwrap();
    let array = base64url_encode(b"[]");
    for token in [
        String::new(),
        "abc".to_string(),
        "a.b".to_string(),
        "a.b.c.d".to_string(),
        "a.b.c.d.e.f".to_string(),
        format!("{}.eA.c2ln", no_alg),
        format!("{}.eA.c2ln", array),
        "!!!.eA.c2ln".to_string(),
    ] {
        let err = serializer.decode_with_keys(&token, &[key.clone()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format, "{token:?}");
    }

    let valid = sign(&serializer, "HS256", &key, b"x");
    let bad_signature = format!("{}!", valid);
    let err = serializer.decode_with_keys(&bad_signature, &[key]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn excessive_pbes2_count_is_rejected() {
    let serializer = fast_serializer();
    let pw = symmetric("pw", b"hunter2hunter2");
    let token = encrypt(&serializer, "PBES2-HS256+A128KW", "A128GCM", &pw, b"x");

    let mut header = Header::from_segment(segments(&token)[0]).unwrap();
    header.insert("p2c", 50_000_000u64);
    let segment = header.to_segment().unwrap();
    let mut parts = segments(&token);
    parts[0] = &segment;
    let err = serializer.decode_with_keys(&parts.join("."), &[pw]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

// ============================================================================
// Candidate keys
// ============================================================================

#[test]
fn jws_without_kid_tries_every_candidate() {
    let serializer = JoseSerializer::default();
    let wrong = anonymous(&[1; 32]);
    let right = anonymous(&[2; 32]);
    let token = sign(&serializer, "HS256", &right, b"x");
    assert_eq!(Header::from_segment(segments(&token)[0]).unwrap().kid(), None);

    let keys = collection(vec![wrong.clone(), right]);
    assert_eq!(serializer.try_decode(&token, &keys).unwrap().payload, b"x");

    assert_integrity(serializer.decode_with_keys(&token, &[wrong]));
}

#[test]
fn jwe_failures_are_swallowed_until_a_key_fits() {
    let serializer = JoseSerializer::default();
    let wrong = anonymous(&[1; 16]);
    let right = anonymous(&[2; 16]);
    let token = encrypt(&serializer, "A128KW", "A128GCM", &right, b"found");

    let keys = collection(vec![wrong.clone(), anonymous(&[3; 16]), right]);
    assert_eq!(serializer.try_decode(&token, &keys).unwrap().payload, b"found");

    let keys = collection(vec![wrong, anonymous(&[3; 16])]);
    assert_integrity(serializer.try_decode(&token, &keys));
}

#[test]
fn kid_header_restricts_candidates() {
    let serializer = JoseSerializer::default();
    let a = symmetric("a", &[1; 32]);
    let b = symmetric("b", &[1; 32]);
    let token = sign(&serializer, "HS256", &a, b"x");

    let err = serializer.decode_with_keys(&token, &[b.clone()]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatchingKey);

    let decoded = serializer.decode_with_keys(&token, &[b, a]).unwrap();
    assert_eq!(decoded.key_id.as_deref(), Some("a"));
}

#[test]
fn keys_of_the_wrong_type_are_not_candidates() {
    let serializer = JoseSerializer::default();
    let ec = generate("ec", AlgorithmFamily::Signature, "ES256");
    let token = sign(&serializer, "ES256", &ec, b"x");
    let err = serializer
        .decode_with_keys(&token, &[anonymous(&[0; 32])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatchingKey);
}
