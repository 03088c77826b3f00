//! Partitioned tables shared by the pruning tests.

use crate::cache::PartitionCache;
use crate::catalog::{IndexDef, InMemoryCatalog, PartitionDef, TableDef};
use crate::expr::{Expr, PartitionExpression};
use crate::partition::{ClassId, HeapFileId, IndexId, PartitionBounds, PartitionKind, ReprId};
use crate::value::{DbType, DbValue};

use super::context::{PruningContext, PruningEnv, PruningScope};

/// Attribute partitioning every fixture table.
pub(crate) const KEY_ATTR: u32 = 1;
/// Name of the index every fixture table carries on `(KEY_ATTR, 2)`.
pub(crate) const INDEX_NAME: &str = "idx_key";

fn table(root: u64, kind: PartitionKind, expression: PartitionExpression, bounds: Vec<PartitionBounds>) -> TableDef {
    let partitions = bounds
        .into_iter()
        .enumerate()
        .map(|(i, bounds)| {
            let class = root + 1 + i as u64;
            PartitionDef {
                class_id: ClassId(class),
                name: format!("t{root}__p{i}"),
                heap_id: HeapFileId(class * 10),
                repr_id: ReprId(10 + i as u32),
                bounds,
                indexes: vec![IndexDef {
                    name: INDEX_NAME.to_string(),
                    id: IndexId(class * 100),
                }],
            }
        })
        .collect();
    TableDef {
        class_id: ClassId(root),
        name: format!("t{root}"),
        heap_id: HeapFileId(root * 10),
        repr_id: ReprId(1),
        kind,
        expression,
        partitions,
        indexes: vec![IndexDef {
            name: INDEX_NAME.to_string(),
            id: IndexId(root * 100),
        }],
    }
}

/// RANGE table on the integer column `KEY_ATTR`; `None` is MINVALUE or
/// MAXVALUE.
pub(crate) fn range_table(root: u64, bounds: &[(Option<i64>, Option<i64>)]) -> TableDef {
    range_table_on(root, PartitionExpression::column(KEY_ATTR, DbType::Int), bounds)
}

/// RANGE table on an arbitrary integer expression.
pub(crate) fn range_table_on(
    root: u64,
    expression: PartitionExpression,
    bounds: &[(Option<i64>, Option<i64>)],
) -> TableDef {
    let bounds = bounds
        .iter()
        .map(|(min, max)| (min.map(DbValue::Int), max.map(DbValue::Int)))
        .collect();
    range_table_with(root, expression, bounds)
}

/// RANGE table whose bounds may be of any type.
pub(crate) fn range_table_with(
    root: u64,
    expression: PartitionExpression,
    bounds: Vec<(Option<DbValue>, Option<DbValue>)>,
) -> TableDef {
    let bounds = bounds
        .into_iter()
        .map(|(min, max)| PartitionBounds::Range { min, max })
        .collect();
    table(root, PartitionKind::Range, expression, bounds)
}

/// `[MIN, 10) [10, 20) [20, MAX)`
pub(crate) fn orders_table(root: u64) -> TableDef {
    range_table(root, &[(None, Some(10)), (Some(10), Some(20)), (Some(20), None)])
}

/// LIST table on the integer column `KEY_ATTR`.
pub(crate) fn list_table(root: u64, lists: Vec<Vec<DbValue>>) -> TableDef {
    let bounds = lists
        .into_iter()
        .map(|values| PartitionBounds::List { values })
        .collect();
    table(
        root,
        PartitionKind::List,
        PartitionExpression::column(KEY_ATTR, DbType::Int),
        bounds,
    )
}

/// HASH table with `count` buckets on a column of type `ty`.
pub(crate) fn hash_table(root: u64, count: usize, ty: DbType) -> TableDef {
    table(
        root,
        PartitionKind::Hash,
        PartitionExpression::column(KEY_ATTR, ty),
        vec![PartitionBounds::Hash; count],
    )
}

/// Integer column reference to `KEY_ATTR`.
pub(crate) fn key() -> Expr {
    Expr::attr(KEY_ATTR, DbType::Int)
}

/// Catalog plus cache for one test.
pub(crate) struct Harness {
    pub(crate) catalog: InMemoryCatalog,
    pub(crate) cache: PartitionCache,
}

impl Harness {
    pub(crate) fn new(tables: &[TableDef]) -> Self {
        let catalog = InMemoryCatalog::new();
        for table in tables {
            catalog.add_table(table).expect("valid fixture table");
        }
        Self {
            catalog,
            cache: PartitionCache::with_capacity(16),
        }
    }

    /// The catalog doubles as the transaction's schema-change registry.
    pub(crate) fn env(&self) -> PruningEnv<'_> {
        PruningEnv::new(&self.catalog, &self.catalog, &self.cache)
    }

    pub(crate) fn context(&self, root: u64) -> PruningContext {
        let mut ctx = PruningContext::new();
        ctx.load(&self.env(), ClassId(root), PruningScope::Root)
            .expect("load context");
        ctx
    }
}
