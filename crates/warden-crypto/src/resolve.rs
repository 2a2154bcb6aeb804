//! Provider resolution: algorithm code + key set to a bound provider.
//!
//! 1. Find the descriptor for the code within the factory's family.
//! 2. Pick a key of the descriptor's type, by `kid` when one is given.
//! 3. Let the factory check the key size and bind the provider.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::algorithm::{AlgorithmDescriptor, AlgorithmRegistry, KeyType};
use crate::error::CryptoError;
use crate::key::SecretKey;
use crate::provider::CryptoFactory;

/// What the key will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Producing a token: without an explicit `kid`, keys outside their
    /// validity window or with another usage are skipped.
    Encode { now: DateTime<Utc> },
    /// Consuming a token: every key of the right type is a candidate.
    Decode,
}

#[derive(Debug, Clone, Copy)]
pub struct KeySelector<'a> {
    pub kid: Option<&'a str>,
    pub purpose: Purpose,
}

impl<'a> KeySelector<'a> {
    pub fn encode(kid: Option<&'a str>) -> Self {
        Self {
            kid,
            purpose: Purpose::Encode { now: Utc::now() },
        }
    }

    pub fn decode(kid: Option<&'a str>) -> Self {
        Self {
            kid,
            purpose: Purpose::Decode,
        }
    }
}

fn is_candidate(
    key: &SecretKey,
    descriptor: &AlgorithmDescriptor,
    selector: &KeySelector<'_>,
) -> bool {
    // Disposed keys fail every accessor and are never candidates.
    let (Ok(key_type), Ok(kid), Ok(metadata)) =
        (key.effective_key_type(), key.key_id(), key.metadata())
    else {
        return false;
    };
    if !descriptor.accepts_key_type(key_type) {
        return false;
    }
    if let Some(wanted) = selector.kid {
        return kid == Some(wanted);
    }
    match selector.purpose {
        Purpose::Decode => true,
        Purpose::Encode { now } => {
            metadata.is_valid_at(now)
                && metadata
                    .usage
                    .map_or(true, |usage| usage.permits(descriptor.family()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResolver {
    registry: AlgorithmRegistry,
}

impl ProviderResolver {
    pub fn new(registry: AlgorithmRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Every key in `keys` that may serve `descriptor`, in collection order.
    pub fn candidates(
        &self,
        descriptor: &AlgorithmDescriptor,
        keys: &[Arc<SecretKey>],
        selector: &KeySelector<'_>,
    ) -> Vec<Arc<SecretKey>> {
        if descriptor.key_type() == KeyType::None {
            return vec![Arc::new(SecretKey::none())];
        }
        keys.iter()
            .filter(|key| is_candidate(key, descriptor, selector))
            .cloned()
            .collect()
    }

    /// First candidate, or [`CryptoError::NoMatchingKey`].
    pub fn select_key(
        &self,
        descriptor: &AlgorithmDescriptor,
        keys: &[Arc<SecretKey>],
        selector: &KeySelector<'_>,
    ) -> Result<Arc<SecretKey>, CryptoError> {
        self.candidates(descriptor, keys, selector)
            .into_iter()
            .next()
            .ok_or_else(|| {
                debug!(
                    alg = descriptor.code(),
                    kid = selector.kid,
                    keys = keys.len(),
                    "no matching key"
                );
                CryptoError::NoMatchingKey(descriptor.code().to_string())
            })
    }

    /// Resolve `code` in the factory's family and bind the selected key.
    pub fn resolve<F: CryptoFactory>(
        &self,
        factory: &F,
        code: &str,
        keys: &[Arc<SecretKey>],
        selector: &KeySelector<'_>,
    ) -> Result<F::Provider, CryptoError> {
        let descriptor = self.registry.find(factory.family(), code)?;
        let key = self.select_key(&descriptor, keys, selector)?;
        factory.create_provider(key, descriptor)
    }

    /// Bind an explicitly chosen key, skipping selection.
    pub fn resolve_with_key<F: CryptoFactory>(
        &self,
        factory: &F,
        code: &str,
        key: Arc<SecretKey>,
    ) -> Result<F::Provider, CryptoError> {
        let descriptor = self.registry.find(factory.family(), code)?;
        let key = if descriptor.key_type() == KeyType::None {
            Arc::new(SecretKey::none())
        } else {
            key
        };
        factory.create_provider(key, descriptor)
    }
}
