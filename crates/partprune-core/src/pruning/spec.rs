//! Pruning of scan access specs.

use serde::{Deserialize, Serialize};

use crate::bitset::PruningBitset;
use crate::error::Result;
use crate::expr::{EvalContext, Expr};
use crate::partition::{AttrId, ClassId, HeapFileId, IndexId};
use crate::predicate::{Predicate, PruningOp};

use super::context::{PruningContext, PruningEnv, PruningScope};
use super::matcher::{match_index, match_predicate};

/// Shape of an index key range.
///
/// Names read lower bound then upper bound: `GeLt` is `key1 <= k < key2`,
/// `Inf` is an open end and `Na` an absent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeType {
    /// `key1 <= k <= key2`
    GeLe,
    /// `key1 <= k < key2`
    GeLt,
    /// `key1 < k <= key2`
    GtLe,
    /// `key1 < k < key2`
    GtLt,
    /// `key1 <= k`
    GeInf,
    /// `key1 < k`
    GtInf,
    /// `k <= key2`
    InfLe,
    /// `k < key2`
    InfLt,
    /// Every key.
    InfInf,
    /// `k = key1`
    EqNa,
    /// No range.
    NaNa,
    /// `k <= key1 or k >= key2`
    LeGe,
    /// `k <= key1 or k > key2`
    LeGt,
    /// `k < key1 or k >= key2`
    LtGe,
    /// `k < key1 or k > key2`
    LtGt,
    /// `k <> key1`
    NeqNa,
}

impl RangeType {
    /// Operators applied to `key1` and `key2`; `None` where the bound does
    /// not prune.
    #[must_use]
    pub fn operators(self) -> (Option<PruningOp>, Option<PruningOp>) {
        use PruningOp::{Eq, Ge, Gt, Le, Lt};
        match self {
            Self::GeLe => (Some(Ge), Some(Le)),
            Self::GeLt => (Some(Ge), Some(Lt)),
            Self::GtLe => (Some(Gt), Some(Le)),
            Self::GtLt => (Some(Gt), Some(Lt)),
            Self::GeInf => (Some(Ge), None),
            Self::GtInf => (Some(Gt), None),
            Self::InfLe => (None, Some(Le)),
            Self::InfLt => (None, Some(Lt)),
            Self::EqNa => (Some(Eq), None),
            Self::InfInf
            | Self::NaNa
            | Self::LeGe
            | Self::LeGt
            | Self::LtGe
            | Self::LtGt
            | Self::NeqNa => (None, None),
        }
    }
}

/// One key range of an index scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRange {
    /// Range shape.
    pub range: RangeType,
    /// Lower (or only) key.
    pub key1: Option<Expr>,
    /// Upper key.
    pub key2: Option<Expr>,
}

impl KeyRange {
    /// Creates a key range.
    #[must_use]
    pub fn new(range: RangeType, key1: Option<Expr>, key2: Option<Expr>) -> Self {
        Self { range, key1, key2 }
    }

    /// `k = key`
    #[must_use]
    pub fn eq(key: Expr) -> Self {
        Self::new(RangeType::EqNa, Some(key), None)
    }
}

/// Index access of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexScan {
    /// Index name; every partition carries a local index of that name.
    pub index_name: String,
    /// Key columns in index order.
    pub key_attrs: Vec<AttrId>,
    /// Key ranges searched.
    pub key_ranges: Vec<KeyRange>,
}

/// How a scan reads its class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    /// Heap scan.
    Sequential,
    /// Index scan.
    Index(IndexScan),
}

/// A partition the scan must visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionHandle {
    /// Partition class.
    pub class_id: ClassId,
    /// Heap file of the partition.
    pub heap_id: HeapFileId,
    /// The partition's copy of the scanned index, for index scans.
    pub index_id: Option<IndexId>,
}

/// Access-plan node over a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessSpec {
    /// Scanned class.
    pub class_id: ClassId,
    /// Access method.
    pub method: AccessMethod,
    /// Filter applied to fetched rows.
    #[serde(default)]
    pub where_pred: Option<Predicate>,
    /// Filter applied to index keys.
    #[serde(default)]
    pub where_key: Option<Predicate>,
    /// Set once pruning ran.
    #[serde(default)]
    pub pruned: bool,
    /// Partitions to visit, in catalog order.
    #[serde(default)]
    pub partitions: Vec<PartitionHandle>,
}

impl AccessSpec {
    /// Heap scan of `class_id`.
    #[must_use]
    pub fn heap_scan(class_id: ClassId, where_pred: Option<Predicate>) -> Self {
        Self {
            class_id,
            method: AccessMethod::Sequential,
            where_pred,
            where_key: None,
            pruned: false,
            partitions: Vec::new(),
        }
    }

    /// Index scan of `class_id`.
    #[must_use]
    pub fn index_scan(class_id: ClassId, scan: IndexScan) -> Self {
        Self {
            class_id,
            method: AccessMethod::Index(scan),
            where_pred: None,
            where_key: None,
            pruned: false,
            partitions: Vec::new(),
        }
    }
}

/// Prunes an access spec in place.
///
/// On return `spec.pruned` is set and `spec.partitions` lists the partitions
/// to visit. An unpartitioned class yields an empty list.
///
/// # Errors
///
/// Propagates catalog failures, evaluation failures of predicate operands,
/// and missing per-partition indexes.
pub fn prune_spec(env: &PruningEnv<'_>, spec: &mut AccessSpec, eval: &EvalContext<'_>) -> Result<()> {
    spec.pruned = false;
    spec.partitions.clear();

    let mut ctx = PruningContext::new();
    ctx.load(env, spec.class_id, PruningScope::Root)?;
    if !ctx.is_partitioned() {
        spec.pruned = true;
        return Ok(());
    }

    let selected = match &spec.method {
        AccessMethod::Sequential => prune_heap_scan(&ctx, spec, eval)?,
        AccessMethod::Index(scan) => {
            let position = if env.options.index_key_pruning {
                ctx.key_attribute()
                    .and_then(|attr| scan.key_attrs.iter().position(|k| *k == attr))
            } else {
                None
            };
            ctx.set_attr_position(position);
            prune_index_scan(&ctx, spec, scan, eval)?
        }
    };

    let index_name = match &spec.method {
        AccessMethod::Index(scan) => Some(scan.index_name.as_str()),
        AccessMethod::Sequential => None,
    };
    let mut handles = Vec::with_capacity(selected.popcount());
    for ordinal in &selected {
        let partition = &ctx.partitions()[ordinal];
        let index_id = match index_name {
            Some(name) => Some(env.catalog.find_index(partition.class_id, name)?),
            None => None,
        };
        handles.push(PartitionHandle {
            class_id: partition.class_id,
            heap_id: partition.heap_id,
            index_id,
        });
    }

    tracing::debug!(
        class = %spec.class_id,
        selected = handles.len(),
        total = ctx.partition_count(),
        "Access spec pruned"
    );
    spec.partitions = handles;
    spec.pruned = true;
    ctx.clear();
    Ok(())
}

fn prune_heap_scan(
    ctx: &PruningContext,
    spec: &AccessSpec,
    eval: &EvalContext<'_>,
) -> Result<PruningBitset> {
    let all = PruningBitset::full(ctx.partition_count());
    Ok(match &spec.where_pred {
        Some(pred) => match_predicate(ctx, pred, eval)?.bitset().copied().unwrap_or(all),
        None => all,
    })
}

fn prune_index_scan(
    ctx: &PruningContext,
    spec: &AccessSpec,
    scan: &IndexScan,
    eval: &EvalContext<'_>,
) -> Result<PruningBitset> {
    let mut selected = PruningBitset::full(ctx.partition_count());
    for pred in [&spec.where_pred, &spec.where_key].into_iter().flatten() {
        selected = match_predicate(ctx, pred, eval)?.narrow(selected);
    }
    if ctx.attr_position().is_some() {
        selected = match_index(ctx, &scan.key_ranges, eval)?.narrow(selected);
    }
    Ok(selected)
}
