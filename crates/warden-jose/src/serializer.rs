//! Compact JWS/JWE encoding and decoding.
//!
//! Encode: build header → resolve providers → produce body → join segments.
//! Decode mirrors it; the segment count picks JWS or JWE before any
//! algorithm is resolved.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, trace};
use warden_crypto::base64url::encoded_len;
use warden_crypto::{
    base64url_decode, base64url_encode_into, AeadFactory, AlgorithmFamily, AlgorithmParams,
    AlgorithmRegistry, CompressionFactory, CompressionProvider, CryptoError, CryptoFactory,
    ErrorKind, KeyMaterial, KeyMetadata, KeySelector, KeyWrapFactory, ProviderResolver,
    SecretKey, SecretKeyCollection, SecurePool, SignatureFactory, SignatureProvider,
};
use zeroize::Zeroizing;

use crate::compact::{CompactToken, JweParts, JwsParts};
use crate::credentials::{Credentials, EncryptingCredentials, KeySource, SigningCredentials};
use crate::error::JoseError;
use crate::header::{Header, ALG, CTY, ENC, KID, TYP, ZIP};
use crate::options::SerializerOptions;

const NESTED_CTY: &str = "JWT";
const UNSECURED: &str = "none";

/// A verified or decrypted token.
#[derive(Clone)]
pub struct DecodedToken {
    /// Header of the token that carried the payload (the inner JWS when
    /// nested).
    pub header: Header,
    pub payload: Vec<u8>,
    /// `kid` of the key that verified or decrypted the payload.
    pub key_id: Option<String>,
    /// Header of the enclosing JWE when a nested token was unwrapped.
    pub outer_header: Option<Header>,
}

impl DecodedToken {
    pub fn is_nested(&self) -> bool {
        self.outer_header.is_some()
    }

    pub fn payload_str(&self) -> Result<&str, JoseError> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| JoseError::Format("payload is not UTF-8".to_string()))
    }
}

impl fmt::Debug for DecodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedToken")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .field("key_id", &self.key_id)
            .field("outer_header", &self.outer_header)
            .finish()
    }
}

pub struct JoseSerializer {
    resolver: ProviderResolver,
    options: SerializerOptions,
    pool: SecurePool,
    key_wrap: KeyWrapFactory,
    compression: CompressionFactory,
}

impl Default for JoseSerializer {
    fn default() -> Self {
        Self::new(AlgorithmRegistry::builtin(), SerializerOptions::default())
    }
}

impl fmt::Debug for JoseSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoseSerializer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl JoseSerializer {
    pub fn new(registry: AlgorithmRegistry, options: SerializerOptions) -> Self {
        Self {
            resolver: ProviderResolver::new(registry),
            key_wrap: KeyWrapFactory::with_pbes2(
                options.pbes2_iterations,
                options.pbes2_max_iterations,
            ),
            compression: CompressionFactory::with_max_output(options.max_decompressed_size),
            pool: SecurePool::new(),
            options,
        }
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        self.resolver.registry()
    }

    // ========================================================================
    // Encode
    // ========================================================================

    /// Produce a compact token.
    ///
    /// Signing credentials alone give a JWS, encrypting credentials alone a
    /// JWE. With both, the payload is signed and the JWS is encrypted with
    /// `cty: "JWT"`; `extra_headers` then go on the inner JWS. Algorithm
    /// mandated fields always win over `extra_headers`.
    pub fn encode(
        &self,
        payload: &[u8],
        credentials: &Credentials,
        extra_headers: Option<&Header>,
    ) -> Result<String, JoseError> {
        match (&credentials.signing, &credentials.encrypting) {
            (Some(signing), None) => self.encode_jws(payload, signing, extra_headers),
            (None, Some(encrypting)) => {
                self.encode_jwe(payload, encrypting, extra_headers, None)
            }
            (Some(signing), Some(encrypting)) => {
                let inner = Zeroizing::new(self.encode_jws(payload, signing, extra_headers)?);
                self.encode_jwe(inner.as_bytes(), encrypting, None, Some(NESTED_CTY))
            }
            (None, None) => Err(JoseError::MissingCredentials),
        }
    }

    fn encode_jws(
        &self,
        payload: &[u8],
        signing: &SigningCredentials,
        extra_headers: Option<&Header>,
    ) -> Result<String, JoseError> {
        let signer: SignatureProvider =
            self.resolve(&SignatureFactory, &signing.algorithm, &signing.source)?;

        let mut mandated = Header::new().with(ALG, signer.descriptor().code());
        if let Some(kid) = signer.key().key_id()? {
            mandated.insert(KID, kid);
        }
        let header = self.finish_header(mandated, extra_headers);

        let mut token = header.to_segment()?;
        token.push('.');
        self.push_segment(&mut token, payload)?;
        let signature = signer.sign(token.as_bytes())?;
        token.push('.');
        self.push_segment(&mut token, &signature)?;

        trace!(alg = signer.descriptor().code(), len = token.len(), "encoded JWS");
        Ok(token)
    }

    fn encode_jwe(
        &self,
        payload: &[u8],
        encrypting: &EncryptingCredentials,
        extra_headers: Option<&Header>,
        cty: Option<&str>,
    ) -> Result<String, JoseError> {
        let enc = self
            .registry()
            .find(AlgorithmFamily::AuthenticatedEncryption, &encrypting.encryption)?;
        let wrapper = self
            .resolve(&self.key_wrap, &encrypting.algorithm, &encrypting.source)?
            .with_party_info(encrypting.party.clone());
        let compressor = encrypting
            .compression
            .as_deref()
            .map(|zip| self.compressor(zip))
            .transpose()?
            .filter(|compressor| !compressor.is_identity());

        let wrapped = wrapper.wrap_new_key(&enc)?;

        let mut mandated = Header::new()
            .with(ALG, wrapper.descriptor().code())
            .with(ENC, enc.code());
        if let Some(compressor) = &compressor {
            mandated.insert(ZIP, compressor.descriptor().code());
        }
        if let Some(kid) = wrapper.key().key_id()? {
            mandated.insert(KID, kid);
        }
        if let Some(cty) = cty {
            mandated.insert(CTY, cty);
        }
        mandated.set_wrap_parameters(&wrapped.parameters)?;
        let header = self.finish_header(mandated, extra_headers);
        let header_segment = header.to_segment()?;

        let mut compressed = self.pool.rent(0, true);
        let plaintext = match &compressor {
            Some(compressor) => {
                compressor.compress_into(payload, &mut compressed)?;
                &compressed[..]
            }
            None => payload,
        };

        let cek = content_key(&wrapped.cek);
        let sealed = AeadFactory
            .create_provider(cek.clone(), enc.clone())
            .and_then(|aead| aead.encrypt(plaintext, header_segment.as_bytes()));
        cek.dispose();
        let sealed = sealed?;

        let mut token = header_segment;
        for segment in [
            &wrapped.encrypted_key[..],
            &sealed.iv[..],
            &sealed.ciphertext[..],
            &sealed.tag[..],
        ] {
            token.push('.');
            self.push_segment(&mut token, segment)?;
        }

        trace!(
            alg = wrapper.descriptor().code(),
            enc = enc.code(),
            len = token.len(),
            "encoded JWE"
        );
        Ok(token)
    }

    fn finish_header(&self, mandated: Header, extra_headers: Option<&Header>) -> Header {
        let mut header = Header::merged(mandated, extra_headers);
        if let Some(typ) = &self.options.default_typ {
            if !header.contains(TYP) {
                header.insert(TYP, typ.clone());
            }
        }
        header
    }

    fn resolve<F: CryptoFactory>(
        &self,
        factory: &F,
        code: &str,
        source: &KeySource,
    ) -> Result<F::Provider, JoseError> {
        let provider = match source {
            KeySource::Key(key) => self.resolver.resolve_with_key(factory, code, key.clone())?,
            KeySource::Collection { keys, kid } => {
                let snapshot = keys.snapshot()?;
                let selector = KeySelector::encode(kid.as_deref());
                self.resolver.resolve(factory, code, &snapshot, &selector)?
            }
        };
        Ok(provider)
    }

    fn compressor(&self, zip: &str) -> Result<CompressionProvider, CryptoError> {
        self.resolver
            .resolve_with_key(&self.compression, zip, Arc::new(SecretKey::none()))
    }

    /// Base64URL-encode `data` onto the end of `token` through a pooled
    /// scratch buffer.
    fn push_segment(&self, token: &mut String, data: &[u8]) -> Result<(), JoseError> {
        let mut scratch = self.pool.rent(encoded_len(data.len()), false);
        token.push_str(base64url_encode_into(data, &mut scratch)?);
        Ok(())
    }

    // ========================================================================
    // Decode
    // ========================================================================

    /// Verify or decrypt `token` with keys from `keys`.
    pub fn try_decode(
        &self,
        token: &str,
        keys: &SecretKeyCollection,
    ) -> Result<DecodedToken, JoseError> {
        let snapshot = keys.snapshot()?;
        self.decode_with_keys(token, &snapshot)
    }

    /// [`JoseSerializer::try_decode`] over an explicit key list.
    ///
    /// With a `kid` header only that key is tried; otherwise every key of the
    /// right type is, in order. Failing keys are skipped and the result is a
    /// single [`JoseError::Integrity`] once all are exhausted.
    pub fn decode_with_keys(
        &self,
        token: &str,
        keys: &[Arc<SecretKey>],
    ) -> Result<DecodedToken, JoseError> {
        if token.len() > self.options.max_token_length {
            return Err(JoseError::Format(format!(
                "token exceeds {} bytes",
                self.options.max_token_length
            )));
        }
        match CompactToken::parse(token)? {
            CompactToken::Jws(parts) => self.decode_jws(&parts, keys),
            CompactToken::Jwe(parts) => {
                let decoded = self.decode_jwe(&parts, keys)?;
                if self.options.unwrap_nested && decoded.header.is_nested_jwt() {
                    self.decode_nested(decoded, keys)
                } else {
                    Ok(decoded)
                }
            }
        }
    }

    fn decode_nested(
        &self,
        outer: DecodedToken,
        keys: &[Arc<SecretKey>],
    ) -> Result<DecodedToken, JoseError> {
        let inner = std::str::from_utf8(&outer.payload)
            .map_err(|_| JoseError::Format("nested token is not UTF-8".to_string()))?;
        let CompactToken::Jws(parts) = CompactToken::parse(inner)? else {
            return Err(JoseError::Format("nested token is not a JWS".to_string()));
        };
        let mut decoded = self.decode_jws(&parts, keys)?;
        decoded.outer_header = Some(outer.header);
        Ok(decoded)
    }

    fn check_critical(&self, header: &Header) -> Result<(), JoseError> {
        for name in header.critical()? {
            if !self.options.critical_headers.iter().any(|known| known == name) {
                return Err(JoseError::Format(format!(
                    "unsupported critical header parameter {}",
                    name
                )));
            }
        }
        Ok(())
    }

    fn decode_jws(
        &self,
        parts: &JwsParts<'_>,
        keys: &[Arc<SecretKey>],
    ) -> Result<DecodedToken, JoseError> {
        let header = Header::from_segment(parts.header)?;
        self.check_critical(&header)?;
        let alg = header
            .alg()
            .ok_or_else(|| JoseError::Format("missing alg header".to_string()))?;
        if alg == UNSECURED && !self.options.allow_unsecured {
            return Err(JoseError::UnsecuredTokenRejected);
        }
        let descriptor = self.registry().find(AlgorithmFamily::Signature, alg)?;
        let signature = base64url_decode(parts.signature)?;
        let payload = base64url_decode(parts.payload)?;

        let candidates =
            self.resolver
                .candidates(&descriptor, keys, &KeySelector::decode(header.kid()));
        if candidates.is_empty() {
            debug!(alg, "no candidate key for JWS");
            return Err(CryptoError::NoMatchingKey(alg.to_string()).into());
        }
        trace!(alg, candidates = candidates.len(), "verifying JWS");

        let mut binding_error = None;
        let mut attempted = 0;
        for key in candidates {
            let verifier = match SignatureFactory.create_provider(key, descriptor.clone()) {
                Ok(verifier) => verifier,
                Err(e) => {
                    binding_error = Some(e);
                    continue;
                }
            };
            attempted += 1;
            if let Ok(true) = verifier.verify(parts.signing_input.as_bytes(), &signature) {
                let key_id = verifier.key().key_id()?.map(str::to_string);
                return Ok(DecodedToken {
                    header,
                    payload,
                    key_id,
                    outer_header: None,
                });
            }
        }

        debug!(alg, attempted, "JWS verification failed");
        match binding_error {
            Some(e) if attempted == 0 => Err(e.into()),
            _ => Err(JoseError::Integrity),
        }
    }

    fn decode_jwe(
        &self,
        parts: &JweParts<'_>,
        keys: &[Arc<SecretKey>],
    ) -> Result<DecodedToken, JoseError> {
        let header = Header::from_segment(parts.header)?;
        self.check_critical(&header)?;
        let alg = header
            .alg()
            .ok_or_else(|| JoseError::Format("missing alg header".to_string()))?;
        let enc = header
            .enc()
            .ok_or_else(|| JoseError::Format("missing enc header".to_string()))?;

        let descriptor = self.registry().find(AlgorithmFamily::KeyManagement, alg)?;
        let enc = self
            .registry()
            .find(AlgorithmFamily::AuthenticatedEncryption, enc)?;
        let decompressor = header.zip().map(|zip| self.compressor(zip)).transpose()?;
        let AlgorithmParams::KeyManagement(kind) = descriptor.params() else {
            return Err(CryptoError::FamilyMismatch {
                code: alg.to_string(),
                expected: AlgorithmFamily::KeyManagement.name(),
            }
            .into());
        };
        let parameters = header.wrap_parameters(kind)?;

        let encrypted_key = self.pool.decode_base64url(parts.encrypted_key)?;
        let iv = self.pool.decode_base64url(parts.iv)?;
        let ciphertext = self.pool.decode_base64url(parts.ciphertext)?;
        let tag = self.pool.decode_base64url(parts.tag)?;
        let mut plaintext = self.pool.rent(ciphertext.len(), true);
        let mut inflated = self.pool.rent(0, true);
        // AAD is the header segment as received, not a re-serialization.
        let aad = parts.header.as_bytes();

        let candidates =
            self.resolver
                .candidates(&descriptor, keys, &KeySelector::decode(header.kid()));
        if candidates.is_empty() {
            debug!(alg, "no candidate key for JWE");
            return Err(CryptoError::NoMatchingKey(alg.to_string()).into());
        }
        trace!(alg, enc = enc.code(), candidates = candidates.len(), "decrypting JWE");

        let mut binding_error = None;
        let mut attempted = 0;
        for key in candidates {
            let unwrapper = match self.key_wrap.create_provider(key, descriptor.clone()) {
                Ok(unwrapper) => unwrapper,
                Err(e) => {
                    binding_error = Some(e);
                    continue;
                }
            };
            attempted += 1;
            let cek = match unwrapper.unwrap_key(&encrypted_key, &parameters, &enc) {
                Ok(cek) => cek,
                // Malformed header parameters fail the same way for every key.
                Err(e) if e.kind() == ErrorKind::Format => return Err(e.into()),
                Err(_) => continue,
            };

            let cek = content_key(&cek);
            let opened = AeadFactory
                .create_provider(cek.clone(), enc.clone())
                .and_then(|aead| {
                    aead.decrypt_into(&ciphertext, &iv, &tag, aad, &mut plaintext)
                });
            cek.dispose();
            let Ok(len) = opened else {
                continue;
            };
            plaintext.truncate(len);

            let key_id = unwrapper.key().key_id()?.map(str::to_string);
            let payload = match &decompressor {
                Some(decompressor) => {
                    decompressor.decompress_into(
                        &plaintext,
                        &AtomicBool::new(false),
                        &mut inflated,
                    )?;
                    inflated.to_vec()
                }
                None => plaintext.to_vec(),
            };
            return Ok(DecodedToken {
                header,
                payload,
                key_id,
                outer_header: None,
            });
        }

        debug!(alg, attempted, "JWE decryption failed");
        match binding_error {
            Some(e) if attempted == 0 => Err(e.into()),
            _ => Err(JoseError::Integrity),
        }
    }
}

/// Short-lived symmetric key holding a CEK; disposed right after use.
fn content_key(cek: &[u8]) -> Arc<SecretKey> {
    Arc::new(SecretKey::new(
        None,
        KeyMaterial::symmetric(cek),
        KeyMetadata::default(),
    ))
}
