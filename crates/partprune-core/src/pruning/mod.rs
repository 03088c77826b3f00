//! Partition pruning for scans and row placement.
//!
//! A statement loads a [`PruningContext`] for the table it touches, prunes
//! with its predicates or places its rows, and clears the context when done.
//! Results are [`PruningBitset`](crate::bitset::PruningBitset)s over the
//! table's real partitions, turned into handles by [`prune_spec`].

mod context;
mod matcher;
mod placement;
mod spec;
mod strategy;

#[cfg(test)]
mod matcher_tests;
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use context::{PlacementState, PruningContext, PruningEnv, PruningOptions, PruningScope};
pub use matcher::{match_index, match_key_range, match_predicate, prune_with_value};
pub use placement::{
    prune_insert, prune_insert_with, prune_update, prune_update_with, PlacementTarget,
};
pub use spec::{
    prune_spec, AccessMethod, AccessSpec, IndexScan, KeyRange, PartitionHandle, RangeType,
};
pub use strategy::{prune_hash, prune_list, prune_range, prune_value, PruneOutcome};

use crate::error::Result;
use crate::partition::{ClassId, PartitionDescriptor};

/// Descriptor list of `root`, master entry first; empty when the class is
/// not partitioned.
///
/// Reads the cache when the class is not under schema change, otherwise the
/// catalog. A catalog read does not populate the cache.
///
/// # Errors
///
/// Propagates catalog failures.
pub fn get_partitions(env: &PruningEnv<'_>, root: ClassId) -> Result<Vec<PartitionDescriptor>> {
    if !env.txn.is_class_being_modified(root) {
        if let Some(entry) = env.cache.get(root) {
            return Ok(entry.partitions().to_vec());
        }
    }
    env.catalog.class_partitions(root)
}

/// Class ids of the real partitions of `root`, in catalog order.
///
/// # Errors
///
/// Propagates catalog failures.
pub fn get_partition_ids(env: &PruningEnv<'_>, root: ClassId) -> Result<Vec<ClassId>> {
    Ok(get_partitions(env, root)?
        .iter()
        .skip(1)
        .map(|p| p.class_id)
        .collect())
}
