//! The algorithm registry: a [`Collection`] of descriptors with lookups.

use std::sync::Arc;

use tracing::debug;

use super::{builtin_descriptors, AlgorithmDescriptor, AlgorithmFamily, KeyType};
use crate::error::CryptoError;
use crate::source::{ChangeToken, Collection, DataSource, StaticSource};

pub type AlgorithmCollection = Collection<AlgorithmDescriptor>;

fn family_code(d: &AlgorithmDescriptor) -> String {
    format!("{}:{}", d.family().name(), d.code())
}

/// Catalog of descriptors, merged from one or more sources.
///
/// Constructed explicitly and passed by reference; there is no process-wide
/// instance. Codes are unique within a family; when two sources publish the
/// same code, the earlier source wins.
#[derive(Clone, Debug)]
pub struct AlgorithmRegistry {
    descriptors: AlgorithmCollection,
}

impl AlgorithmRegistry {
    /// Registry holding only the built-in descriptors.
    pub fn builtin() -> Self {
        Self {
            descriptors: AlgorithmCollection::from_items(builtin_descriptors(), true),
        }
    }

    /// Built-in descriptors followed by `extra` sources. Fails if any of
    /// `extra` is already disposed.
    pub fn with_sources(
        extra: Vec<Arc<dyn DataSource<AlgorithmDescriptor>>>,
    ) -> Result<Self, CryptoError> {
        let builtin: Arc<dyn DataSource<AlgorithmDescriptor>> =
            Arc::new(StaticSource::new(builtin_descriptors(), true));
        let mut builder = AlgorithmCollection::builder()
            .source(builtin, true)
            .dedup_by(family_code);
        for source in extra {
            builder = builder.source(source, true);
        }
        Ok(Self {
            descriptors: builder.build()?,
        })
    }

    /// Wrap an existing collection as-is.
    pub fn from_collection(descriptors: AlgorithmCollection) -> Self {
        Self { descriptors }
    }

    pub fn collection(&self) -> &AlgorithmCollection {
        &self.descriptors
    }

    pub fn change_token(&self) -> ChangeToken {
        self.descriptors.change_token()
    }

    /// Look up a descriptor by family and wire code.
    pub fn find(
        &self,
        family: AlgorithmFamily,
        code: &str,
    ) -> Result<Arc<AlgorithmDescriptor>, CryptoError> {
        let snapshot = self.descriptors.snapshot()?;
        snapshot
            .iter()
            .find(|d| d.family() == family && d.code() == code)
            .cloned()
            .ok_or_else(|| {
                debug!(code, family = family.name(), "unknown algorithm");
                CryptoError::UnknownAlgorithm(code.to_string())
            })
    }

    /// Look up a descriptor by family, wire code and accepted key type.
    ///
    /// Codes are only unique within a family (`none` is both the unsecured
    /// signature and the identity compression), hence the family argument.
    pub fn find_for_key_type(
        &self,
        family: AlgorithmFamily,
        code: &str,
        key_type: KeyType,
    ) -> Result<Arc<AlgorithmDescriptor>, CryptoError> {
        let snapshot = self.descriptors.snapshot()?;
        snapshot
            .iter()
            .find(|d| d.family() == family && d.code() == code && d.accepts_key_type(key_type))
            .cloned()
            .ok_or_else(|| CryptoError::UnknownAlgorithm(code.to_string()))
    }

    /// Codes registered in `family`, in registry order.
    pub fn codes(&self, family: AlgorithmFamily) -> Result<Vec<String>, CryptoError> {
        Ok(self
            .descriptors
            .snapshot()?
            .iter()
            .filter(|d| d.family() == family)
            .map(|d| d.code().to_string())
            .collect())
    }

    pub fn dispose(&self) {
        self.descriptors.dispose();
    }
}
