//! Routing rows being inserted or updated to their partition.

use serde::{Deserialize, Serialize};

use crate::catalog::Record;
use crate::error::{Error, Result};
use crate::expr::EvalContext;
use crate::partition::{ClassId, HeapFileId, ReprId};
use crate::predicate::PruningOp;
use crate::value::DbValue;

use super::context::{PlacementState, PruningContext, PruningEnv, PruningScope};
use super::matcher::prune_with_value;
use super::strategy::PruneOutcome;

/// Destination of a written row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementTarget {
    /// Partition class.
    pub class_id: ClassId,
    /// Heap file of the partition.
    pub heap_id: HeapFileId,
    /// Representation the record now carries.
    pub repr_id: ReprId,
}

/// Resolves the partition of a row inserted into `class`.
///
/// Returns `Ok(None)` when `class` is not partitioned. When the destination
/// differs from `class`, the record's representation id is replaced with
/// the partition's.
///
/// # Errors
///
/// Returns [`Error::PartitionNotExist`] when no partition accepts the row,
/// and propagates catalog and evaluation failures.
pub fn prune_insert(
    env: &PruningEnv<'_>,
    class: ClassId,
    record: &mut Record,
) -> Result<Option<PlacementTarget>> {
    let mut ctx = PruningContext::new();
    let target = prune_insert_with(&mut ctx, env, class, record);
    ctx.clear();
    target
}

/// [`prune_insert`] with a caller-owned context reused across rows.
///
/// The context is reloaded only when `class` changes or a previous row
/// failed.
///
/// # Errors
///
/// See [`prune_insert`].
pub fn prune_insert_with(
    ctx: &mut PruningContext,
    env: &PruningEnv<'_>,
    class: ClassId,
    record: &mut Record,
) -> Result<Option<PlacementTarget>> {
    ensure_loaded(ctx, env, class)?;
    if !ctx.is_partitioned() {
        return Ok(None);
    }
    find_partition_for_record(ctx, env, class, record).map(Some)
}

/// Resolves the partition of a row updated through `class`.
///
/// `class` is either the partitioned root or the partition the row was read
/// from. A class with several superclasses is not a partition and is left
/// alone.
///
/// # Errors
///
/// See [`prune_insert`].
pub fn prune_update(
    env: &PruningEnv<'_>,
    class: ClassId,
    record: &mut Record,
) -> Result<Option<PlacementTarget>> {
    let mut ctx = PruningContext::new();
    let target = prune_update_with(&mut ctx, env, class, record);
    ctx.clear();
    target
}

/// [`prune_update`] with a caller-owned context reused across rows.
///
/// # Errors
///
/// See [`prune_insert`].
pub fn prune_update_with(
    ctx: &mut PruningContext,
    env: &PruningEnv<'_>,
    class: ClassId,
    record: &mut Record,
) -> Result<Option<PlacementTarget>> {
    let root = match env.catalog.superclasses(class)?.as_slice() {
        [] => class,
        [root] => *root,
        supers => {
            tracing::warn!(%class, count = supers.len(), "Updated class has several superclasses, not a partition");
            return Ok(None);
        }
    };
    ensure_loaded(ctx, env, root)?;
    if !ctx.is_partitioned() {
        return Ok(None);
    }
    find_partition_for_record(ctx, env, class, record).map(Some)
}

fn ensure_loaded(ctx: &mut PruningContext, env: &PruningEnv<'_>, root: ClassId) -> Result<()> {
    let reusable = ctx.loaded_for() == Some(root) && ctx.state() != PlacementState::Failed;
    if !reusable {
        ctx.load(env, root, PruningScope::Root)?;
    }
    Ok(())
}

/// Evaluates the partition expression over `record`, read as a row of
/// `class`, and picks the single partition holding the result.
fn find_partition_for_record(
    ctx: &mut PruningContext,
    env: &PruningEnv<'_>,
    class: ClassId,
    record: &mut Record,
) -> Result<PlacementTarget> {
    ctx.set_state(PlacementState::ContextLoaded);
    match resolve(ctx, env, class, record) {
        Ok(target) => Ok(target),
        Err(err) => {
            ctx.set_state(PlacementState::Failed);
            Err(err)
        }
    }
}

fn resolve(
    ctx: &mut PruningContext,
    env: &PruningEnv<'_>,
    class: ClassId,
    record: &mut Record,
) -> Result<PlacementTarget> {
    let master_repr = ctx
        .descriptors()
        .first()
        .map(|master| master.repr_id)
        .ok_or_else(|| Error::Internal("pruning context has no master partition entry".into()))?;
    *ctx.scratch_mut() = env.catalog.decode_record(class, master_repr, record)?;

    let value = {
        let expression = ctx
            .expression()
            .ok_or_else(|| Error::Internal("pruning context has no partition expression".into()))?;
        expression.root.evaluate(ctx.scratch(), &EvalContext::default())?
    };
    ctx.set_state(PlacementState::KeyEvaluated);

    let op = if value.is_null() {
        PruningOp::IsNull
    } else {
        PruningOp::Eq
    };
    let root = ctx.root().unwrap_or(class);
    let selected = match prune_with_value(ctx, &value, op) {
        PruneOutcome::Matched(set) => set,
        PruneOutcome::NotMatched => return Err(not_exist(root, &value)),
    };
    let ordinal = match (selected.single(), selected.popcount()) {
        (Some(ordinal), _) => ordinal,
        (None, 0) => return Err(not_exist(root, &value)),
        (None, n) => {
            return Err(Error::Internal(format!(
                "value {value} of {root} routes to {n} partitions"
            )))
        }
    };

    let partition = ctx
        .partitions()
        .get(ordinal)
        .ok_or_else(|| Error::Internal(format!("partition ordinal {ordinal} out of range")))?;
    let target = PlacementTarget {
        class_id: partition.class_id,
        heap_id: partition.heap_id,
        repr_id: partition.repr_id,
    };
    if target.class_id != class && record.repr_id != target.repr_id {
        record.repr_id = target.repr_id;
    }
    ctx.select(ordinal);
    tracing::trace!(%root, partition = %target.class_id, %value, "Row placed");
    Ok(PlacementTarget {
        repr_id: record.repr_id,
        ..target
    })
}

fn not_exist(class: ClassId, value: &DbValue) -> Error {
    Error::PartitionNotExist {
        class,
        value: value.to_string(),
    }
}
