//! Tests for the partition metadata cache

use std::sync::Arc;
use std::thread;

use super::*;
use crate::catalog::{Catalog, InMemoryCatalog, ReadOnlyTransaction, Record};
use crate::error::Error;
use crate::expr::Row;
use crate::partition::{
    AttrId, ClassId, HeapFileId, IndexId, PartitionBounds, PartitionDescriptor, PartitionKind, ReprId,
};
use crate::pruning::test_fixtures::{hash_table, orders_table};
use crate::value::DbType;

fn descriptors(root: u64) -> Vec<PartitionDescriptor> {
    orders_table(root).descriptors().expect("descriptors")
}

fn entry(root: u64) -> CacheEntry {
    CacheEntry::new(ClassId(root), descriptors(root)).expect("entry")
}

// ========== Entry Tests ==========

#[test]
fn test_entry_records_key_attribute() {
    let entry = entry(100);

    assert_eq!(entry.root(), ClassId(100));
    assert_eq!(entry.partitions().len(), 4);
    assert_eq!(entry.key_attribute(), Some(AttrId(1)));
}

#[test]
fn test_entry_rejects_list_without_master() {
    let mut list = descriptors(100);
    list.remove(0);

    let result = CacheEntry::new(ClassId(100), list);

    assert!(matches!(result, Err(Error::InvalidPartitionSchema(_))));
}

#[test]
fn test_entry_rejects_corrupt_expression() {
    let mut list = descriptors(100);
    list[0] = PartitionDescriptor::master(
        ClassId(100),
        HeapFileId(1000),
        PartitionKind::Range,
        vec![0xff],
        ReprId(1),
    );

    assert!(matches!(
        CacheEntry::new(ClassId(100), list),
        Err(Error::Serialization(_))
    ));
}

// ========== Lifecycle Tests ==========

#[test]
fn test_new_cache_is_uninitialized() {
    let cache = PartitionCache::new();

    assert!(!cache.is_initialized());
    assert!(cache.is_empty());
    assert!(cache.get(ClassId(100)).is_none());
    assert!(matches!(cache.insert(entry(100)), InsertOutcome::Disabled(_)));
}

#[test]
fn test_initialize_is_idempotent() {
    let cache = PartitionCache::with_capacity(4);
    cache.insert(entry(100));

    cache.initialize(64);

    assert!(cache.is_initialized());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_finalize_drops_entries() {
    let cache = PartitionCache::with_capacity(4);
    cache.insert(entry(100));

    cache.finalize();
    cache.finalize();

    assert!(!cache.is_initialized());
    assert!(cache.get(ClassId(100)).is_none());
}

// ========== Insert / Get Tests ==========

#[test]
fn test_first_insert_wins() {
    // Arrange
    let cache = PartitionCache::with_capacity(4);
    let first = match cache.insert(entry(100)) {
        InsertOutcome::Inserted(e) => e,
        other => panic!("expected insert, got {other:?}"),
    };

    // Act
    let second = cache.insert(entry(100));

    // Assert
    match second {
        InsertOutcome::Existing(e) => assert!(Arc::ptr_eq(&e, &first)),
        other => panic!("expected existing, got {other:?}"),
    }
    let stats = cache.stats();
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.discarded_races, 1);
}

#[test]
fn test_get_returns_shared_entry() {
    let cache = PartitionCache::with_capacity(4);
    cache.insert(entry(100));

    let a = cache.get(ClassId(100)).expect("cached");
    let b = cache.get(ClassId(100)).expect("cached");

    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_invalidate() {
    // Arrange
    let cache = PartitionCache::with_capacity(4);
    cache.insert(entry(100));
    let held = cache.get(ClassId(100)).expect("cached");

    // Act
    cache.invalidate(ClassId(100));
    cache.invalidate(ClassId(999));

    // Assert
    assert!(cache.get(ClassId(100)).is_none());
    assert_eq!(held.partitions().len(), 4);
    assert_eq!(cache.stats().invalidations, 1);
}

#[test]
fn test_stats_hit_rate() {
    let cache = PartitionCache::with_capacity(4);
    assert!((cache.stats().hit_rate() - 0.0).abs() < f64::EPSILON);
    cache.insert(entry(100));

    for root in [100, 100, 100, 200] {
        let _ = cache.get(ClassId(root));
    }

    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
}

// ========== Load-Through Tests ==========

fn catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.add_table(&orders_table(100)).expect("orders");
    catalog.add_table(&hash_table(200, 3, DbType::Int)).expect("hash");
    catalog
}

#[test]
fn test_get_or_load_populates_once() {
    // Arrange
    let cache = PartitionCache::with_capacity(4);
    let catalog = catalog();

    // Act
    let first = cache
        .get_or_load(&ReadOnlyTransaction, &catalog, ClassId(100))
        .expect("load")
        .expect("partitioned");
    let second = cache
        .get_or_load(&ReadOnlyTransaction, &catalog, ClassId(100))
        .expect("load")
        .expect("partitioned");

    // Assert
    assert!(first.is_cached());
    assert!(second.is_cached());
    assert_eq!(first.descriptors(), second.descriptors());
    assert_eq!(catalog.partition_loads(), 1);
}

#[test]
fn test_get_or_load_unpartitioned_part_is_none() {
    let cache = PartitionCache::with_capacity(4);
    let catalog = catalog();

    // a partition class has no descriptor list of its own
    let set = cache
        .get_or_load(&ReadOnlyTransaction, &catalog, ClassId(101))
        .expect("load");

    assert!(set.is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_get_or_load_bypasses_cache_under_schema_change() {
    // Arrange
    let cache = PartitionCache::with_capacity(4);
    let catalog = catalog();
    cache
        .get_or_load(&ReadOnlyTransaction, &catalog, ClassId(100))
        .expect("warm");
    catalog.begin_schema_change(ClassId(100));

    // Act
    let set = cache
        .get_or_load(&catalog, &catalog, ClassId(100))
        .expect("load")
        .expect("partitioned");

    // Assert
    assert!(!set.is_cached());
    assert_eq!(catalog.partition_loads(), 2);
    assert_eq!(cache.stats().hits, 0);
}

struct CorruptCatalog;

impl Catalog for CorruptCatalog {
    fn class_partitions(&self, root: ClassId) -> crate::error::Result<Vec<PartitionDescriptor>> {
        let mut list = descriptors(root.0);
        list[0] = PartitionDescriptor::master(root, HeapFileId(1), PartitionKind::Range, vec![0xff], ReprId(1));
        Ok(list)
    }

    fn superclasses(&self, _class: ClassId) -> crate::error::Result<Vec<ClassId>> {
        Ok(Vec::new())
    }

    fn decode_record(&self, _class: ClassId, _repr: ReprId, record: &Record) -> crate::error::Result<Row> {
        record.decode()
    }

    fn find_index(&self, class: ClassId, name: &str) -> crate::error::Result<IndexId> {
        Err(Error::Catalog(format!("{class} has no index named '{name}'")))
    }
}

#[test]
fn test_get_or_load_refuses_corrupt_metadata() {
    let cache = PartitionCache::with_capacity(4);

    let loaded = cache.get_or_load(&ReadOnlyTransaction, &CorruptCatalog, ClassId(100));

    assert!(matches!(loaded, Err(Error::Serialization(_))));
    assert!(cache.is_empty());
}

#[test]
fn test_get_or_load_without_cache_returns_owned() {
    let cache = PartitionCache::new();
    let catalog = catalog();

    let set = cache
        .get_or_load(&ReadOnlyTransaction, &catalog, ClassId(200))
        .expect("load")
        .expect("partitioned");

    assert!(!set.is_cached());
    assert_eq!(set.descriptors().len(), 4);
    assert!(matches!(set.descriptors()[1].bounds, PartitionBounds::Hash));
}

// ========== Concurrency Tests ==========

#[test]
fn test_concurrent_loaders_share_one_entry() {
    let cache = Arc::new(PartitionCache::with_capacity(4));
    let catalog = Arc::new(catalog());
    let mut handles = vec![];

    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let catalog = Arc::clone(&catalog);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                let set = cache
                    .get_or_load(&ReadOnlyTransaction, catalog.as_ref(), ClassId(100))
                    .expect("load")
                    .expect("partitioned");
                assert_eq!(set.descriptors().len(), 4);
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let stats = cache.stats();
    assert_eq!(cache.len(), 1);
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.hits + stats.misses, 400);
    assert_eq!(stats.misses, 1 + stats.discarded_races);
}
