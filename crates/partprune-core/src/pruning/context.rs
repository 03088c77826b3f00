//! Per-operation pruning state.

use crate::cache::{PartitionCache, PartitionSet};
use crate::catalog::{Catalog, TransactionView};
use crate::config::PruningConfig;
use crate::error::{Error, Result};
use crate::expr::{PartitionExpression, Row};
use crate::partition::{AttrId, ClassId, PartitionDescriptor, PartitionKind, MAX_PARTITIONS};

/// Collaborators and options shared by every pruning call of a statement.
#[derive(Clone, Copy)]
pub struct PruningEnv<'a> {
    /// Schema and heap access.
    pub catalog: &'a dyn Catalog,
    /// Current transaction.
    pub txn: &'a dyn TransactionView,
    /// Shared metadata cache.
    pub cache: &'a PartitionCache,
    /// Tunables.
    pub options: PruningOptions,
}

impl<'a> PruningEnv<'a> {
    /// Environment with default options.
    #[must_use]
    pub fn new(
        catalog: &'a dyn Catalog,
        txn: &'a dyn TransactionView,
        cache: &'a PartitionCache,
    ) -> Self {
        Self {
            catalog,
            txn,
            cache,
            options: PruningOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: PruningOptions) -> Self {
        self.options = options;
        self
    }
}

/// Pruning tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruningOptions {
    /// Narrow index scans by their key ranges.
    pub index_key_pruning: bool,
    /// Largest partition count accepted from the catalog.
    pub max_partitions: usize,
}

impl Default for PruningOptions {
    fn default() -> Self {
        Self {
            index_key_pruning: true,
            max_partitions: MAX_PARTITIONS,
        }
    }
}

impl From<&PruningConfig> for PruningOptions {
    fn from(config: &PruningConfig) -> Self {
        Self {
            index_key_pruning: config.index_key_pruning,
            max_partitions: config.max_partitions.min(MAX_PARTITIONS),
        }
    }
}

/// What the caller handed to [`PruningContext::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningScope {
    /// The partitioned root class itself.
    Root,
    /// One of its partitions; the root is looked up first.
    Partition,
}

/// Progress of a write-path placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementState {
    /// Nothing loaded.
    #[default]
    Unloaded,
    /// Descriptors and expression are available.
    ContextLoaded,
    /// The routing value of the current row is known.
    KeyEvaluated,
    /// The row has a destination partition.
    PartitionResolved,
    /// Placement failed; the context must be cleared or reloaded.
    Failed,
}

/// State of one pruning or placement operation on a partitioned table.
///
/// The descriptor list is either borrowed from the shared cache or owned.
/// The decoded partition expression is always owned and rebuilt on load.
#[derive(Debug, Default)]
pub struct PruningContext {
    loaded_for: Option<ClassId>,
    root: Option<ClassId>,
    partitions: Option<PartitionSet>,
    expression: Option<PartitionExpression>,
    key_attribute: Option<AttrId>,
    attr_position: Option<usize>,
    selected: Option<usize>,
    state: PlacementState,
    scratch: Row,
}

impl PruningContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the partition metadata of `class`.
    ///
    /// With [`PruningScope::Partition`] the root is resolved through the
    /// superclass list first: no superclass, or more than one, leaves the
    /// context unpartitioned. A class without partitions also leaves the
    /// context unpartitioned; that is not an error.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures, a corrupt expression stream, or a
    /// partition count above the configured maximum. The context is cleared
    /// before returning an error.
    pub fn load(&mut self, env: &PruningEnv<'_>, class: ClassId, scope: PruningScope) -> Result<()> {
        self.clear();
        let loaded = self.resolve_and_load(env, class, scope);
        match &loaded {
            Ok(()) => self.loaded_for = Some(class),
            Err(_) => self.clear(),
        }
        loaded
    }

    fn resolve_and_load(&mut self, env: &PruningEnv<'_>, class: ClassId, scope: PruningScope) -> Result<()> {
        let root = match scope {
            PruningScope::Root => class,
            PruningScope::Partition => match env.catalog.superclasses(class)?.as_slice() {
                [root] => *root,
                [] => return Ok(()),
                supers => {
                    tracing::warn!(%class, count = supers.len(), "Partition has several superclasses, not pruning");
                    return Ok(());
                }
            },
        };
        self.load_root(env, root)
    }

    fn load_root(&mut self, env: &PruningEnv<'_>, root: ClassId) -> Result<()> {
        let Some(set) = env.cache.get_or_load(env.txn, env.catalog, root)? else {
            return Ok(());
        };

        let descriptors = set.descriptors();
        let count = descriptors.len().saturating_sub(1);
        if count > env.options.max_partitions {
            return Err(Error::TooManyPartitions {
                count,
                max: env.options.max_partitions,
            });
        }
        let stream = descriptors
            .first()
            .and_then(PartitionDescriptor::expression_stream)
            .ok_or_else(|| {
                Error::InvalidPartitionSchema(format!("{root} has no master partition entry"))
            })?;
        let expression = PartitionExpression::decode(stream)?;

        tracing::trace!(%root, partitions = count, cached = set.is_cached(), "Pruning context loaded");
        self.key_attribute = match &set {
            PartitionSet::Cached(entry) => entry.key_attribute(),
            PartitionSet::Owned(_) => expression.key_attribute(),
        };
        self.expression = Some(expression);
        self.partitions = Some(set);
        self.root = Some(root);
        self.state = PlacementState::ContextLoaded;
        Ok(())
    }

    /// Releases the descriptor list (dropping only the reference if it is
    /// cache-borrowed), the expression and scratch state. Idempotent.
    pub fn clear(&mut self) {
        self.loaded_for = None;
        self.root = None;
        self.partitions = None;
        self.expression = None;
        self.key_attribute = None;
        self.attr_position = None;
        self.selected = None;
        self.state = PlacementState::Unloaded;
        self.scratch.clear();
    }

    /// Returns true if a partitioned root is loaded.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        self.partitions.is_some()
    }

    /// Class most recently passed to [`load`](Self::load).
    #[must_use]
    pub fn loaded_for(&self) -> Option<ClassId> {
        self.loaded_for
    }

    /// Root class, once loaded.
    #[must_use]
    pub fn root(&self) -> Option<ClassId> {
        self.root
    }

    /// Returns true if the descriptor list is borrowed from the cache.
    #[must_use]
    pub fn is_from_cache(&self) -> bool {
        self.partitions.as_ref().is_some_and(PartitionSet::is_cached)
    }

    /// Full descriptor list, master entry first; empty when unloaded.
    #[must_use]
    pub fn descriptors(&self) -> &[PartitionDescriptor] {
        match &self.partitions {
            Some(set) => set.descriptors(),
            None => &[],
        }
    }

    /// Real partitions in catalog order.
    #[must_use]
    pub fn partitions(&self) -> &[PartitionDescriptor] {
        self.descriptors().get(1..).unwrap_or(&[])
    }

    /// Number of real partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions().len()
    }

    /// Partitioning strategy.
    #[must_use]
    pub fn kind(&self) -> Option<PartitionKind> {
        self.descriptors().first().map(|master| master.kind)
    }

    /// Decoded partition expression.
    #[must_use]
    pub fn expression(&self) -> Option<&PartitionExpression> {
        self.expression.as_ref()
    }

    /// Attribute of a bare-column partition expression.
    #[must_use]
    pub fn key_attribute(&self) -> Option<AttrId> {
        self.key_attribute
    }

    /// Position of the key attribute within the index being pruned.
    #[must_use]
    pub fn attr_position(&self) -> Option<usize> {
        self.attr_position
    }

    pub(crate) fn set_attr_position(&mut self, position: Option<usize>) {
        self.attr_position = position;
    }

    /// Ordinal of the partition chosen by placement.
    #[must_use]
    pub fn selected_partition(&self) -> Option<usize> {
        self.selected
    }

    /// Descriptor of the partition chosen by placement.
    #[must_use]
    pub fn selected_descriptor(&self) -> Option<&PartitionDescriptor> {
        self.selected.and_then(|i| self.partitions().get(i))
    }

    /// Placement progress.
    #[must_use]
    pub fn state(&self) -> PlacementState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PlacementState) {
        self.state = state;
    }

    pub(crate) fn select(&mut self, ordinal: usize) {
        self.selected = Some(ordinal);
        self.state = PlacementState::PartitionResolved;
    }

    pub(crate) fn scratch_mut(&mut self) -> &mut Row {
        &mut self.scratch
    }

    pub(crate) fn scratch(&self) -> &Row {
        &self.scratch
    }
}
