//! Process-wide partition metadata cache.
//!
//! Maps a root class to its descriptor list so that pruning does not read
//! the catalog for every statement.
//!
//! # Thread-Safety
//!
//! One `parking_lot::RwLock` guards the whole map. Lookups share the lock;
//! initialize, finalize, insert and invalidate take it exclusively. Catalog
//! reads on a miss happen outside the lock, so two loaders may race; the
//! first insert wins and the loser adopts the stored entry.

mod partition_cache;

pub use partition_cache::{CacheEntry, CacheStats, InsertOutcome, PartitionCache, PartitionSet};

#[cfg(test)]
mod tests;
