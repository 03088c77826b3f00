//! Matching predicates and index key ranges against the partition
//! expression.

use crate::error::{Error, Result};
use crate::expr::{EvalContext, Expr, FunctionKind};
use crate::predicate::{Predicate, PruningOp};
use crate::value::DbValue;

use super::context::PruningContext;
use super::spec::KeyRange;
use super::strategy::{prune_value, PruneOutcome};

/// Prunes with a predicate tree.
///
/// Comparison and element-of terms prune when one side is the partition
/// expression and the other folds to a value. AND intersects, OR unions,
/// and both children are always evaluated. NOT and LIKE never constrain
/// the key, nor does an operand that fails to fold.
///
/// # Errors
///
/// Propagates operand failures other than evaluation and type errors.
pub fn match_predicate(
    ctx: &PruningContext,
    predicate: &Predicate,
    eval: &EvalContext<'_>,
) -> Result<PruneOutcome> {
    let outcome = match predicate {
        Predicate::And(left, right) => {
            let left = match_predicate(ctx, left, eval)?;
            let right = match_predicate(ctx, right, eval)?;
            left.and(right)
        }
        Predicate::Or(left, right) => {
            let left = match_predicate(ctx, left, eval)?;
            let right = match_predicate(ctx, right, eval)?;
            left.or(right)
        }
        Predicate::Compare { lhs, op, rhs } => {
            let Some(op) = PruningOp::from_rel_op(*op) else {
                return Ok(PruneOutcome::NotMatched);
            };
            if is_partition_expr(ctx, lhs) {
                prune_operand(ctx, rhs.as_ref(), op, eval)?
            } else if let (Some(rhs), Some(op)) = (rhs, op.commute()) {
                if is_partition_expr(ctx, rhs) {
                    prune_operand(ctx, Some(lhs), op, eval)?
                } else {
                    PruneOutcome::NotMatched
                }
            } else {
                PruneOutcome::NotMatched
            }
        }
        Predicate::ElementOf {
            element,
            op,
            quantifier,
            set,
        } => match PruningOp::from_quantified(*op, *quantifier) {
            Some(op) if is_partition_expr(ctx, element) => prune_operand(ctx, Some(set), op, eval)?,
            _ => PruneOutcome::NotMatched,
        },
        Predicate::Like { .. } | Predicate::Not(_) => PruneOutcome::NotMatched,
    };
    Ok(outcome)
}

fn is_partition_expr(ctx: &PruningContext, expr: &Expr) -> bool {
    ctx.expression().is_some_and(|pe| expr.matches(&pe.root))
}

/// Prunes with `partition_expr op operand`, folding the operand to a value.
fn prune_operand(
    ctx: &PruningContext,
    operand: Option<&Expr>,
    op: PruningOp,
    eval: &EvalContext<'_>,
) -> Result<PruneOutcome> {
    let value = if op == PruningOp::IsNull {
        Some(DbValue::Null)
    } else {
        match operand {
            Some(operand) => fold_operand(operand, eval)?,
            None => None,
        }
    };
    Ok(match value {
        Some(value) => prune_with_value(ctx, &value, op),
        None => PruneOutcome::NotMatched,
    })
}

/// Folds an operand to a value. Evaluation and type errors leave the
/// operand unreduced.
fn fold_operand(operand: &Expr, eval: &EvalContext<'_>) -> Result<Option<DbValue>> {
    match operand.fold_constant(eval) {
        Err(Error::Evaluation(reason) | Error::TypeMismatch(reason)) => {
            tracing::debug!(%reason, "Operand not reducible, not pruning on it");
            Ok(None)
        }
        folded => folded,
    }
}

/// Prunes the loaded partitions with `key op value`.
#[must_use]
pub fn prune_with_value(ctx: &PruningContext, value: &DbValue, op: PruningOp) -> PruneOutcome {
    match (ctx.kind(), ctx.expression()) {
        (Some(kind), Some(expression)) => {
            prune_value(ctx.partitions(), kind, expression.domain, value, op)
        }
        _ => PruneOutcome::NotMatched,
    }
}

/// Prunes with one index key range.
///
/// Each bound prunes with its own operator and the two results are
/// intersected; an unusable bound, including one that fails to fold,
/// defers to the other.
///
/// # Errors
///
/// See [`match_predicate`].
pub fn match_key_range(
    ctx: &PruningContext,
    range: &KeyRange,
    eval: &EvalContext<'_>,
) -> Result<PruneOutcome> {
    let (lower_op, upper_op) = range.range.operators();
    let lower = match lower_op {
        Some(op) => prune_key(ctx, range.key1.as_ref(), op, eval)?,
        None => PruneOutcome::NotMatched,
    };
    let upper = match upper_op {
        Some(op) => prune_key(ctx, range.key2.as_ref(), op, eval)?,
        None => PruneOutcome::NotMatched,
    };
    Ok(lower.and(upper))
}

/// Prunes with every key range of an index scan and unions the results.
///
/// Only applies when the partition expression is a bare column found in
/// the index key. One unusable range makes the whole scan unmatched.
///
/// # Errors
///
/// See [`match_predicate`].
pub fn match_index(
    ctx: &PruningContext,
    ranges: &[KeyRange],
    eval: &EvalContext<'_>,
) -> Result<PruneOutcome> {
    if ctx.key_attribute().is_none() || ctx.attr_position().is_none() || ranges.is_empty() {
        return Ok(PruneOutcome::NotMatched);
    }

    let mut combined: Option<PruneOutcome> = None;
    for range in ranges {
        let outcome = match_key_range(ctx, range, eval)?;
        if !outcome.is_matched() {
            return Ok(PruneOutcome::NotMatched);
        }
        combined = Some(match combined {
            Some(acc) => acc.or(outcome),
            None => outcome,
        });
    }
    Ok(combined.unwrap_or(PruneOutcome::NotMatched))
}

fn prune_key(
    ctx: &PruningContext,
    key: Option<&Expr>,
    op: PruningOp,
    eval: &EvalContext<'_>,
) -> Result<PruneOutcome> {
    let Some(key) = key else {
        return Ok(PruneOutcome::NotMatched);
    };
    let Some(position) = ctx.attr_position() else {
        return Ok(PruneOutcome::NotMatched);
    };
    Ok(match key_value(key, position, eval)? {
        Some(value) => prune_with_value(ctx, &value, op),
        None => PruneOutcome::NotMatched,
    })
}

/// Value of the key column at `position` inside an index key.
///
/// Multi-column keys are searched by position; a key shorter than
/// `position` does not reference the column.
fn key_value(key: &Expr, position: usize, eval: &EvalContext<'_>) -> Result<Option<DbValue>> {
    match key {
        Expr::Function {
            kind: FunctionKind::MultiKey,
            operands,
        } => match operands.get(position) {
            Some(column) => key_value(column, 0, eval),
            None => Ok(None),
        },
        other => fold_operand(other, eval),
    }
}
