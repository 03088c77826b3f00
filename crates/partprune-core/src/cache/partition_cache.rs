//! Descriptor-list cache keyed by root class.

#![allow(clippy::cast_precision_loss)] // Precision loss acceptable for hit rate calculation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::catalog::{Catalog, TransactionView};
use crate::error::{Error, Result};
use crate::expr::PartitionExpression;
use crate::partition::{AttrId, ClassId, PartitionDescriptor};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the catalog.
    pub misses: u64,
    /// Entries stored.
    pub inserts: u64,
    /// Freshly loaded entries dropped because another loader stored first.
    pub discarded_races: u64,
    /// Entries removed by invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cached metadata of one partitioned table.
///
/// Immutable once built; readers hold it through an `Arc` for as long as
/// their operation runs, even if the entry is invalidated meanwhile.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    root: ClassId,
    partitions: Vec<PartitionDescriptor>,
    key_attribute: Option<AttrId>,
}

impl CacheEntry {
    /// Builds an entry, decoding the master expression once to check it and
    /// to record the bare-column key attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionSchema`] if the list has no master
    /// entry, or a serialization error if its expression is corrupt.
    pub fn new(root: ClassId, partitions: Vec<PartitionDescriptor>) -> Result<Self> {
        let stream = partitions
            .first()
            .and_then(PartitionDescriptor::expression_stream)
            .ok_or_else(|| {
                Error::InvalidPartitionSchema(format!("{root} has no master partition entry"))
            })?;
        let key_attribute = PartitionExpression::decode(stream)?.key_attribute();
        Ok(Self {
            root,
            partitions,
            key_attribute,
        })
    }

    /// Root class.
    #[must_use]
    pub fn root(&self) -> ClassId {
        self.root
    }

    /// Descriptor list, master entry first.
    #[must_use]
    pub fn partitions(&self) -> &[PartitionDescriptor] {
        &self.partitions
    }

    /// Attribute of a bare-column partition expression.
    #[must_use]
    pub fn key_attribute(&self) -> Option<AttrId> {
        self.key_attribute
    }
}

/// Descriptor list held by a pruning context: either borrowed from the cache
/// or owned by the context.
#[derive(Debug, Clone)]
pub enum PartitionSet {
    /// Private copy read straight from the catalog.
    Owned(Vec<PartitionDescriptor>),
    /// Shared cache entry.
    Cached(Arc<CacheEntry>),
}

impl PartitionSet {
    /// Descriptor list, master entry first.
    #[must_use]
    pub fn descriptors(&self) -> &[PartitionDescriptor] {
        match self {
            Self::Owned(partitions) => partitions,
            Self::Cached(entry) => entry.partitions(),
        }
    }

    /// Returns true if the list is borrowed from the cache.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

/// Result of [`PartitionCache::insert`].
#[derive(Debug)]
pub enum InsertOutcome {
    /// The entry was stored.
    Inserted(Arc<CacheEntry>),
    /// Another loader stored first; this is the canonical entry.
    Existing(Arc<CacheEntry>),
    /// The cache is not initialized; the entry is handed back.
    Disabled(CacheEntry),
}

/// Shared cache of partition descriptor lists.
///
/// Created uninitialized; [`initialize`](Self::initialize) and
/// [`finalize`](Self::finalize) bracket its lifetime. While uninitialized
/// every lookup misses and every insert is refused.
#[derive(Debug, Default)]
pub struct PartitionCache {
    entries: RwLock<Option<FxHashMap<ClassId, Arc<CacheEntry>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    discarded_races: AtomicU64,
    invalidations: AtomicU64,
}

impl PartitionCache {
    /// Creates an uninitialized cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache already initialized for `capacity` tables.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cache = Self::new();
        cache.initialize(capacity);
        cache
    }

    /// Allocates the map. Calling it on an initialized cache does nothing.
    pub fn initialize(&self, capacity: usize) {
        let mut entries = self.entries.write();
        if entries.is_none() {
            *entries = Some(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            ));
            tracing::debug!(capacity, "Partition cache initialized");
        }
    }

    /// Drops every entry and returns to the uninitialized state.
    pub fn finalize(&self) {
        if let Some(entries) = self.entries.write().take() {
            tracing::debug!(entries = entries.len(), "Partition cache finalized");
        }
    }

    /// Returns true between `initialize` and `finalize`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.entries.read().is_some()
    }

    /// Number of cached tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().as_ref().map_or(0, FxHashMap::len)
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the entry of `root`.
    #[must_use]
    pub fn get(&self, root: ClassId) -> Option<Arc<CacheEntry>> {
        let found = self
            .entries
            .read()
            .as_ref()
            .and_then(|entries| entries.get(&root).cloned());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Stores `entry` unless its root is already cached.
    pub fn insert(&self, entry: CacheEntry) -> InsertOutcome {
        let mut guard = self.entries.write();
        let Some(entries) = guard.as_mut() else {
            return InsertOutcome::Disabled(entry);
        };
        if let Some(existing) = entries.get(&entry.root) {
            self.discarded_races.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(root = %entry.root, "Partition cache entry already present, discarding copy");
            return InsertOutcome::Existing(Arc::clone(existing));
        }
        let entry = Arc::new(entry);
        entries.insert(entry.root, Arc::clone(&entry));
        self.inserts.fetch_add(1, Ordering::Relaxed);
        InsertOutcome::Inserted(entry)
    }

    /// Removes the entry of `root`. Absent keys are ignored.
    pub fn invalidate(&self, root: ClassId) {
        let removed = self
            .entries
            .write()
            .as_mut()
            .and_then(|entries| entries.remove(&root));
        if removed.is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%root, "Partition cache entry invalidated");
        }
    }

    /// Returns the descriptor list of `root`, from the cache when allowed.
    ///
    /// The cache is bypassed in both directions while `txn` is modifying the
    /// class. Returns `Ok(None)` when the class is not partitioned.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures and rejects a corrupt master expression
    /// before anything is stored.
    pub fn get_or_load(
        &self,
        txn: &dyn TransactionView,
        catalog: &dyn Catalog,
        root: ClassId,
    ) -> Result<Option<PartitionSet>> {
        let modified = txn.is_class_being_modified(root);
        if !modified {
            if let Some(entry) = self.get(root) {
                return Ok(Some(PartitionSet::Cached(entry)));
            }
        }

        let partitions = catalog.class_partitions(root)?;
        if partitions.is_empty() {
            return Ok(None);
        }
        if modified {
            tracing::debug!(%root, "Class under schema change, bypassing partition cache");
            return Ok(Some(PartitionSet::Owned(partitions)));
        }

        let set = match self.insert(CacheEntry::new(root, partitions)?) {
            InsertOutcome::Inserted(entry) | InsertOutcome::Existing(entry) => {
                PartitionSet::Cached(entry)
            }
            InsertOutcome::Disabled(entry) => PartitionSet::Owned(entry.partitions),
        };
        Ok(Some(set))
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            discarded_races: self.discarded_races.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
