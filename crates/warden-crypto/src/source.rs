//! Data sources, change tokens, and the merged collection built from them.
//!
//! Secret keys and algorithm descriptors are both published this way: each
//! source owns an immutable snapshot and a [`ChangeToken`]; a [`Collection`]
//! merges every source, marks itself dirty when any of them fires, and swaps
//! in a rebuilt snapshot on the next read.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::error::CryptoError;

/// Immutable view shared between readers.
pub type Snapshot<T> = Arc<[Arc<T>]>;

type Callback = Arc<dyn Fn(u64) + Send + Sync>;

/// Something that holds resources released by an explicit call.
pub trait Disposable {
    /// Release owned resources. Must be idempotent.
    fn dispose(&self);
}

/// Versioned change notification.
///
/// Cloning yields a handle to the same counter.
#[derive(Clone, Default)]
pub struct ChangeToken {
    version: Arc<AtomicU64>,
    callbacks: Arc<Mutex<Vec<Callback>>>,
}

impl ChangeToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn has_changed_since(&self, version: u64) -> bool {
        self.version() != version
    }

    /// Register a callback invoked with the new version after every change.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Bump the version and notify subscribers.
    pub fn signal(&self) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        // Callbacks run outside the lock so they may subscribe or signal.
        let callbacks: Vec<Callback> = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(version);
        }
        version
    }
}

/// A provider of items plus change notification.
pub trait DataSource<T>: Send + Sync {
    fn snapshot(&self) -> Result<Snapshot<T>, CryptoError>;

    fn change_token(&self) -> &ChangeToken;

    fn dispose(&self);
}

/// A fixed set of items.
pub struct StaticSource<T> {
    items: Snapshot<T>,
    owns: bool,
    disposed: AtomicBool,
    token: ChangeToken,
}

impl<T: Disposable> StaticSource<T> {
    /// `owns` decides whether disposing the source disposes its items.
    pub fn new(items: Vec<Arc<T>>, owns: bool) -> Self {
        Self {
            items: items.into(),
            owns,
            disposed: AtomicBool::new(false),
            token: ChangeToken::new(),
        }
    }
}

impl<T: Disposable + Send + Sync> DataSource<T> for StaticSource<T> {
    fn snapshot(&self) -> Result<Snapshot<T>, CryptoError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(CryptoError::Disposed("data source"));
        }
        Ok(self.items.clone())
    }

    fn change_token(&self) -> &ChangeToken {
        &self.token
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns {
            for item in self.items.iter() {
                item.dispose();
            }
        }
    }
}

/// A source whose whole item set can be replaced at runtime.
pub struct DynamicSource<T> {
    items: RwLock<Snapshot<T>>,
    owns: bool,
    disposed: AtomicBool,
    token: ChangeToken,
}

impl<T: Disposable> DynamicSource<T> {
    pub fn new(items: Vec<Arc<T>>, owns: bool) -> Self {
        Self {
            items: RwLock::new(items.into()),
            owns,
            disposed: AtomicBool::new(false),
            token: ChangeToken::new(),
        }
    }

    /// Atomically replace the item set and signal the change.
    ///
    /// When the source owns its items, items absent from the new set are
    /// disposed.
    pub fn replace(&self, items: Vec<Arc<T>>) -> Result<(), CryptoError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(CryptoError::Disposed("data source"));
        }
        let next: Snapshot<T> = items.into();
        let previous = std::mem::replace(&mut *self.items.write(), next.clone());
        if self.owns {
            for old in previous.iter() {
                if !next.iter().any(|n| Arc::ptr_eq(n, old)) {
                    old.dispose();
                }
            }
        }
        self.token.signal();
        Ok(())
    }
}

impl<T: Disposable + Send + Sync> DataSource<T> for DynamicSource<T> {
    fn snapshot(&self) -> Result<Snapshot<T>, CryptoError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(CryptoError::Disposed("data source"));
        }
        Ok(self.items.read().clone())
    }

    fn change_token(&self) -> &ChangeToken {
        &self.token
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns {
            for item in self.items.read().iter() {
                item.dispose();
            }
        }
    }
}

type DedupKey<T> = fn(&T) -> String;

struct SourceEntry<T> {
    source: Arc<dyn DataSource<T>>,
    owned: bool,
}

struct CollectionState<T> {
    sources: Vec<SourceEntry<T>>,
    dedup: Option<DedupKey<T>>,
    snapshot: RwLock<Snapshot<T>>,
    dirty: AtomicBool,
    rebuilds: AtomicU64,
    disposed: AtomicBool,
    token: ChangeToken,
}

impl<T> CollectionState<T> {
    fn invalidate(&self) {
        // Only the first change of a burst notifies; the rebuild is shared.
        if !self.dirty.swap(true, Ordering::AcqRel) {
            trace!("collection invalidated");
            self.token.signal();
        }
    }

    fn merge(&self) -> Result<Snapshot<T>, CryptoError> {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();
        for entry in &self.sources {
            for item in entry.source.snapshot()?.iter() {
                if let Some(key_of) = self.dedup {
                    let key = key_of(item);
                    if !seen.insert(key.clone()) {
                        warn!(key = %key, "duplicate entry ignored; first source wins");
                        continue;
                    }
                }
                merged.push(item.clone());
            }
        }
        Ok(merged.into())
    }
}

/// Builder for [`Collection`].
pub struct CollectionBuilder<T> {
    sources: Vec<SourceEntry<T>>,
    dedup: Option<DedupKey<T>>,
}

impl<T: Send + Sync + 'static> CollectionBuilder<T> {
    /// Add a source. `owned` sources are disposed with the collection.
    pub fn source(mut self, source: Arc<dyn DataSource<T>>, owned: bool) -> Self {
        self.sources.push(SourceEntry { source, owned });
        self
    }

    /// Drop later items whose key matches an earlier one.
    pub fn dedup_by(mut self, key: DedupKey<T>) -> Self {
        self.dedup = Some(key);
        self
    }

    /// Merge every source once and start listening for changes. Fails when a
    /// source is already disposed.
    pub fn build(self) -> Result<Collection<T>, CryptoError> {
        let state = self.into_state(Vec::new().into());
        *state.snapshot.write() = state.merge()?;
        Ok(Collection::attach(state))
    }

    fn into_state(self, initial: Snapshot<T>) -> Arc<CollectionState<T>> {
        Arc::new(CollectionState {
            sources: self.sources,
            dedup: self.dedup,
            snapshot: RwLock::new(initial),
            dirty: AtomicBool::new(false),
            rebuilds: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            token: ChangeToken::new(),
        })
    }
}

/// Ordered, merged view over one or more data sources.
pub struct Collection<T> {
    state: Arc<CollectionState<T>>,
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("sources", &self.state.sources.len())
            .field("rebuilds", &self.state.rebuilds.load(Ordering::Acquire))
            .field("disposed", &self.state.disposed.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Collection<T> {
    pub fn builder() -> CollectionBuilder<T> {
        CollectionBuilder {
            sources: Vec::new(),
            dedup: None,
        }
    }

    /// Single static source owned by the collection.
    ///
    /// `owns_items` decides whether disposing the collection disposes the items.
    pub fn from_items(items: Vec<Arc<T>>, owns_items: bool) -> Self
    where
        T: Disposable,
    {
        let initial: Snapshot<T> = items.clone().into();
        let source: Arc<dyn DataSource<T>> = Arc::new(StaticSource::new(items, owns_items));
        // The only source is this fresh one, so its items are the snapshot.
        Self::attach(Self::builder().source(source, true).into_state(initial))
    }

    fn attach(state: Arc<CollectionState<T>>) -> Self {
        state.rebuilds.store(1, Ordering::Release);
        for entry in &state.sources {
            let weak: Weak<CollectionState<T>> = Arc::downgrade(&state);
            entry.source.change_token().subscribe(move |_| {
                if let Some(state) = weak.upgrade() {
                    state.invalidate();
                }
            });
        }
        Collection { state }
    }

    /// Current merged snapshot, rebuilding first if any source changed.
    pub fn snapshot(&self) -> Result<Snapshot<T>, CryptoError> {
        let state = &self.state;
        if state.disposed.load(Ordering::Acquire) {
            return Err(CryptoError::Disposed("collection"));
        }
        if state.dirty.load(Ordering::Acquire) {
            let mut guard = state.snapshot.write();
            // Re-check under the lock; another reader may have rebuilt already.
            if state.dirty.swap(false, Ordering::AcqRel) {
                match state.merge() {
                    Ok(merged) => {
                        *guard = merged;
                        let n = state.rebuilds.fetch_add(1, Ordering::AcqRel) + 1;
                        debug!(rebuilds = n, items = guard.len(), "collection rebuilt");
                    }
                    Err(e) => {
                        state.dirty.store(true, Ordering::Release);
                        return Err(e);
                    }
                }
            }
            return Ok(guard.clone());
        }
        Ok(state.snapshot.read().clone())
    }

    /// Token signalled once per invalidation of the merged snapshot.
    pub fn change_token(&self) -> ChangeToken {
        self.state.token.clone()
    }

    /// How many times the merged snapshot has been built.
    pub fn rebuild_count(&self) -> u64 {
        self.state.rebuilds.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Dispose every owned source. Idempotent.
    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in &self.state.sources {
            if entry.owned {
                entry.source.dispose();
            }
        }
        *self.state.snapshot.write() = Vec::new().into();
    }
}
