//! Service facade owning the shared cache.

use std::sync::Arc;

use crate::cache::{CacheStats, PartitionCache};
use crate::catalog::{Catalog, Record, TransactionView};
use crate::config::PruneConfig;
use crate::error::Result;
use crate::expr::EvalContext;
use crate::partition::{ClassId, PartitionDescriptor};
use crate::pruning::{self, AccessSpec, PlacementTarget, PruningEnv, PruningOptions};
use crate::value::DbValue;

/// Pruning engine bound to a catalog and a metadata cache.
///
/// Cheap to share: clone the `Arc`s, or wrap the pruner itself in one.
pub struct PartitionPruner {
    catalog: Arc<dyn Catalog>,
    cache: Arc<PartitionCache>,
    config: PruneConfig,
}

impl PartitionPruner {
    /// Creates a pruner with its own cache, initialized unless disabled by
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(catalog: Arc<dyn Catalog>, config: PruneConfig) -> Result<Self> {
        Self::with_cache(catalog, Arc::new(PartitionCache::new()), config)
    }

    /// Creates a pruner over an existing cache, e.g. one shared by several
    /// engines in a process.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_cache(
        catalog: Arc<dyn Catalog>,
        cache: Arc<PartitionCache>,
        config: PruneConfig,
    ) -> Result<Self> {
        config.validate()?;
        if config.cache.enabled {
            cache.initialize(config.cache.initial_capacity);
        }
        tracing::info!(
            cache_enabled = config.cache.enabled,
            max_partitions = config.pruning.max_partitions,
            "Partition pruner ready"
        );
        Ok(Self {
            catalog,
            cache,
            config,
        })
    }

    /// Environment for one statement of `txn`.
    #[must_use]
    pub fn env<'a>(&'a self, txn: &'a dyn TransactionView) -> PruningEnv<'a> {
        PruningEnv::new(self.catalog.as_ref(), txn, &self.cache)
            .with_options(PruningOptions::from(&self.config.pruning))
    }

    /// Prunes an access spec with bound statement parameters.
    ///
    /// # Errors
    ///
    /// See [`pruning::prune_spec`].
    pub fn prune_spec(
        &self,
        txn: &dyn TransactionView,
        spec: &mut AccessSpec,
        params: &[DbValue],
    ) -> Result<()> {
        pruning::prune_spec(&self.env(txn), spec, &EvalContext::new(params))
    }

    /// Places a row inserted into `class`.
    ///
    /// # Errors
    ///
    /// See [`pruning::prune_insert`].
    pub fn prune_insert(
        &self,
        txn: &dyn TransactionView,
        class: ClassId,
        record: &mut Record,
    ) -> Result<Option<PlacementTarget>> {
        pruning::prune_insert(&self.env(txn), class, record)
    }

    /// Places a row updated through `class`.
    ///
    /// # Errors
    ///
    /// See [`pruning::prune_update`].
    pub fn prune_update(
        &self,
        txn: &dyn TransactionView,
        class: ClassId,
        record: &mut Record,
    ) -> Result<Option<PlacementTarget>> {
        pruning::prune_update(&self.env(txn), class, record)
    }

    /// Descriptor list of `root`.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures.
    pub fn get_partitions(
        &self,
        txn: &dyn TransactionView,
        root: ClassId,
    ) -> Result<Vec<PartitionDescriptor>> {
        pruning::get_partitions(&self.env(txn), root)
    }

    /// Partition class ids of `root`.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures.
    pub fn get_partition_ids(&self, txn: &dyn TransactionView, root: ClassId) -> Result<Vec<ClassId>> {
        pruning::get_partition_ids(&self.env(txn), root)
    }

    /// Drops cached metadata of `root` after a schema change.
    pub fn invalidate(&self, root: ClassId) {
        self.cache.invalidate(root);
    }

    /// Cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<PartitionCache> {
        &self.cache
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PruneConfig {
        &self.config
    }

    /// Finalizes the cache. Later calls keep working without caching.
    pub fn shutdown(&self) {
        self.cache.finalize();
    }
}
