//! Stress tests for concurrent pruning against the shared metadata cache.
//!
//! Threads run a fixed number of operations each; assertions are made on
//! the cache counters once every thread has joined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use partprune_core::cache::PartitionSet;
use partprune_core::catalog::{IndexDef, PartitionDef, ReadOnlyTransaction, TableDef};
use partprune_core::{
    AccessSpec, AttrId, Catalog, ClassId, DbType, DbValue, Expr, HeapFileId, IndexId,
    InMemoryCatalog, PartitionBounds, PartitionCache, PartitionDescriptor, PartitionExpression,
    PartitionKind, PartitionPruner, Predicate, PruneConfig, Record, RelOp, ReprId, Result, Row,
};

const ROOT: u64 = 100;
const KEY: u32 = 1;

/// `count` ranges of width 100 starting at 0, the last one unbounded.
fn ranged_table(count: usize) -> TableDef {
    let partitions = (0..count)
        .map(|i| {
            let class = ROOT + 1 + i as u64;
            let max = if i + 1 == count {
                None
            } else {
                Some(DbValue::Int((i as i64 + 1) * 100))
            };
            PartitionDef {
                class_id: ClassId(class),
                name: format!("t__p{i}"),
                heap_id: HeapFileId(class * 10),
                repr_id: ReprId(10 + i as u32),
                bounds: PartitionBounds::Range {
                    min: Some(DbValue::Int(i as i64 * 100)),
                    max,
                },
                indexes: vec![IndexDef {
                    name: "idx_key".to_string(),
                    id: IndexId(class * 100),
                }],
            }
        })
        .collect();
    TableDef {
        class_id: ClassId(ROOT),
        name: "t".to_string(),
        heap_id: HeapFileId(ROOT * 10),
        repr_id: ReprId(1),
        kind: PartitionKind::Range,
        expression: PartitionExpression::column(KEY, DbType::Int),
        partitions,
        indexes: Vec::new(),
    }
}

fn catalog(count: usize) -> Arc<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    catalog.add_table(&ranged_table(count)).expect("table");
    Arc::new(catalog)
}

/// Catalog holding every descriptor read until all loaders have arrived,
/// so each of them misses the cache.
struct GatedCatalog {
    inner: Arc<InMemoryCatalog>,
    gate: Barrier,
}

impl Catalog for GatedCatalog {
    fn class_partitions(&self, root: ClassId) -> Result<Vec<PartitionDescriptor>> {
        self.gate.wait();
        self.inner.class_partitions(root)
    }

    fn superclasses(&self, class: ClassId) -> Result<Vec<ClassId>> {
        self.inner.superclasses(class)
    }

    fn decode_record(&self, class: ClassId, repr: ReprId, record: &Record) -> Result<Row> {
        self.inner.decode_record(class, repr, record)
    }

    fn find_index(&self, class: ClassId, name: &str) -> Result<IndexId> {
        self.inner.find_index(class, name)
    }
}

// =========================================================================
// Racing loaders
// =========================================================================

#[test]
fn test_racing_loaders_converge_on_one_entry() {
    run_racing_loaders(8);
}

#[test]
fn test_racing_loaders_two_threads() {
    run_racing_loaders(2);
}

fn run_racing_loaders(threads: usize) {
    // Arrange
    let cache = Arc::new(PartitionCache::with_capacity(16));
    let catalog = Arc::new(GatedCatalog {
        inner: catalog(4),
        gate: Barrier::new(threads),
    });

    // Act
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                cache
                    .get_or_load(&ReadOnlyTransaction, catalog.as_ref(), ClassId(ROOT))
                    .expect("load")
                    .expect("partitioned")
            })
        })
        .collect();
    let sets: Vec<PartitionSet> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    // Assert
    let stored = cache.get(ClassId(ROOT)).expect("cached");
    for set in &sets {
        match set {
            PartitionSet::Cached(entry) => assert!(Arc::ptr_eq(entry, &stored)),
            PartitionSet::Owned(_) => panic!("loader kept a private copy"),
        }
    }
    let stats = cache.stats();
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.discarded_races, threads as u64 - 1);
    assert_eq!(stats.misses, threads as u64);
    assert_eq!(cache.len(), 1);
}

// =========================================================================
// Mixed workload
// =========================================================================

/// Smoke test: 4 scanners + 2 writers + 1 invalidator × 50 ops
#[test]
fn test_stress_mixed_smoke() {
    run_mixed_stress(4, 2, 50, 8);
}

/// Medium stress: 8 scanners + 4 writers + 1 invalidator × 200 ops
#[test]
fn test_stress_mixed_medium() {
    run_mixed_stress(8, 4, 200, 32);
}

/// Heavy stress: 32 scanners + 16 writers × 2000 ops (ignored for CI)
#[test]
#[ignore = "Heavy stress test, run manually"]
fn test_stress_mixed_heavy() {
    run_mixed_stress(32, 16, 2_000, 512);
}

fn run_mixed_stress(scanners: usize, writers: usize, ops_per_thread: usize, partitions: usize) {
    let catalog = catalog(partitions);
    let pruner = Arc::new(PartitionPruner::new(catalog, PruneConfig::default()).expect("pruner"));
    let scans = Arc::new(AtomicU64::new(0));
    let placements = Arc::new(AtomicU64::new(0));
    let upper = partitions as i64 * 100;
    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..scanners {
        let pruner = Arc::clone(&pruner);
        let scans = Arc::clone(&scans);
        handles.push(thread::spawn(move || {
            for i in 0..ops_per_thread {
                let key = ((t * ops_per_thread + i) as i64 * 37) % upper;
                let pred = Predicate::compare(
                    Expr::attr(KEY, DbType::Int),
                    RelOp::Eq,
                    Expr::param(0),
                );
                let mut spec = AccessSpec::heap_scan(ClassId(ROOT), Some(pred));
                pruner
                    .prune_spec(&ReadOnlyTransaction, &mut spec, &[DbValue::Int(key)])
                    .expect("prune");

                assert_eq!(spec.partitions.len(), 1);
                let expected = ROOT + 1 + (key / 100) as u64;
                assert_eq!(spec.partitions[0].class_id, ClassId(expected));
                scans.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for t in 0..writers {
        let pruner = Arc::clone(&pruner);
        let placements = Arc::clone(&placements);
        handles.push(thread::spawn(move || {
            for i in 0..ops_per_thread {
                let key = ((t * ops_per_thread + i) as i64 * 53) % upper;
                let row: Row = [(AttrId(KEY), DbValue::Int(key))].into_iter().collect();
                let mut record = Record::encode(&row, ReprId(1)).expect("encode");

                let target = pruner
                    .prune_insert(&ReadOnlyTransaction, ClassId(ROOT), &mut record)
                    .expect("insert")
                    .expect("partitioned");

                let ordinal = (key / 100) as u64;
                assert_eq!(target.class_id, ClassId(ROOT + 1 + ordinal));
                assert_eq!(record.repr_id, ReprId(10 + ordinal as u32));
                placements.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    {
        let pruner = Arc::clone(&pruner);
        handles.push(thread::spawn(move || {
            for _ in 0..ops_per_thread / 10 {
                pruner.invalidate(ClassId(ROOT));
                thread::yield_now();
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let elapsed = start.elapsed();
    let stats = pruner.cache_stats();
    println!(
        "mixed stress: {} scans, {} placements, {} inserts, {} invalidations in {elapsed:?}",
        scans.load(Ordering::Relaxed),
        placements.load(Ordering::Relaxed),
        stats.inserts,
        stats.invalidations
    );

    let total = (scanners + writers) * ops_per_thread;
    assert_eq!(
        scans.load(Ordering::Relaxed) + placements.load(Ordering::Relaxed),
        total as u64
    );
    assert_eq!(stats.hits + stats.misses, total as u64);
    assert!(stats.inserts >= 1);
    assert!(stats.inserts <= stats.invalidations + 1);
}
