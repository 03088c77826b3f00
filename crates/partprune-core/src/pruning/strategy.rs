//! HASH, RANGE and LIST pruning of a single `(value, operator)` pair.

use std::cmp::Ordering;

use crate::bitset::PruningBitset;
use crate::partition::{PartitionBounds, PartitionDescriptor, PartitionKind};
use crate::predicate::PruningOp;
use crate::value::{DbType, DbValue};

/// Outcome of pruning one predicate or key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    /// The set is authoritative.
    Matched(PruningBitset),
    /// The input does not constrain the partition key; every partition
    /// must be assumed.
    NotMatched,
}

impl PruneOutcome {
    /// Returns true for [`PruneOutcome::Matched`].
    #[must_use]
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// The selected set, if matched.
    #[must_use]
    pub fn bitset(&self) -> Option<&PruningBitset> {
        match self {
            Self::Matched(set) => Some(set),
            Self::NotMatched => None,
        }
    }

    /// Conjunction: an unmatched side defers to the other side.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::NotMatched, other) => other,
            (this, Self::NotMatched) => this,
            (Self::Matched(mut left), Self::Matched(right)) => {
                left.intersect(&right);
                Self::Matched(left)
            }
        }
    }

    /// Disjunction: an unmatched side makes the whole unmatched.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Matched(mut left), Self::Matched(right)) => {
                left.union(&right);
                Self::Matched(left)
            }
            _ => Self::NotMatched,
        }
    }

    /// Narrows `current` by this outcome.
    #[must_use]
    pub fn narrow(self, mut current: PruningBitset) -> PruningBitset {
        if let Self::Matched(set) = self {
            current.intersect(&set);
        }
        current
    }
}

/// Prunes `partitions` (the real partitions, master excluded) with
/// `key op value`.
///
/// `domain` is the type of the partition key; hash pruning coerces values
/// into it before hashing.
#[must_use]
pub fn prune_value(
    partitions: &[PartitionDescriptor],
    kind: PartitionKind,
    domain: DbType,
    value: &DbValue,
    op: PruningOp,
) -> PruneOutcome {
    let outcome = match kind {
        PartitionKind::Hash => prune_hash(partitions.len(), domain, value, op),
        PartitionKind::Range => prune_range(partitions, domain, value, op),
        PartitionKind::List => prune_list(partitions, value, op),
    };
    tracing::trace!(%kind, %op, %value, matched = outcome.is_matched(), "Pruned value");
    outcome
}

/// Hash pruning over `count` buckets.
///
/// NULL keys live in bucket 0, so `IS NULL` and equality with NULL select
/// it. A value that cannot be coerced to the key domain matches no row and
/// yields an empty matched set.
#[must_use]
pub fn prune_hash(count: usize, domain: DbType, value: &DbValue, op: PruningOp) -> PruneOutcome {
    let mut set = PruningBitset::new(count);
    match op {
        PruningOp::Eq => {
            if let Some(bucket) = hash_bucket(count, domain, value) {
                set.add(bucket);
            }
        }
        PruningOp::In => {
            let Some(members) = value.as_set() else {
                return PruneOutcome::NotMatched;
            };
            for bucket in members.iter().filter_map(|m| hash_bucket(count, domain, m)) {
                set.add(bucket);
            }
        }
        PruningOp::IsNull => set.add(0),
        _ => return PruneOutcome::NotMatched,
    }
    PruneOutcome::Matched(set)
}

fn hash_bucket(count: usize, domain: DbType, value: &DbValue) -> Option<usize> {
    if value.is_null() {
        return Some(0);
    }
    value.cast_to(domain).map(|key| key.partition_hash(count))
}

/// Range pruning over `[min, max)` partitions; `None` bounds are
/// MINVALUE / MAXVALUE.
///
/// A recognised operator that selects nothing yields `NotMatched`, as does
/// a value that cannot be ordered against the bounds. `domain` is the type
/// of the partition key.
#[must_use]
pub fn prune_range(
    partitions: &[PartitionDescriptor],
    domain: DbType,
    value: &DbValue,
    op: PruningOp,
) -> PruneOutcome {
    let mut set = PruningBitset::new(partitions.len());
    let ranges = partitions.iter().enumerate().filter_map(|(i, p)| match &p.bounds {
        PartitionBounds::Range { min, max } => Some((i, min.as_ref(), max.as_ref())),
        _ => None,
    });

    match op {
        PruningOp::In => {
            let Some(members) = value.as_set() else {
                return PruneOutcome::NotMatched;
            };
            for member in members {
                for (i, min, max) in ranges.clone() {
                    match range_qualifies(min, max, domain, member, PruningOp::Eq) {
                        Some(true) => {
                            set.add(i);
                            break;
                        }
                        Some(false) => {}
                        None => return PruneOutcome::NotMatched,
                    }
                }
            }
        }
        PruningOp::Eq | PruningOp::Lt | PruningOp::Le | PruningOp::Gt | PruningOp::Ge => {
            for (i, min, max) in ranges {
                let Some(hit) = range_qualifies(min, max, domain, value, op) else {
                    return PruneOutcome::NotMatched;
                };
                if hit {
                    set.add(i);
                    if op == PruningOp::Eq {
                        break;
                    }
                }
            }
        }
        PruningOp::IsNull => {
            let mut ranges = ranges;
            if let Some((i, _, _)) = ranges.find(|(_, min, _)| min.is_none()) {
                set.add(i);
            }
        }
        PruningOp::Ne | PruningOp::NotIn => return PruneOutcome::NotMatched,
    }

    if set.is_empty() {
        PruneOutcome::NotMatched
    } else {
        PruneOutcome::Matched(set)
    }
}

/// Whether `[min, max)` holds a key satisfying `key op value`; `None` if the
/// value cannot be ordered against a bound.
fn range_qualifies(
    min: Option<&DbValue>,
    max: Option<&DbValue>,
    domain: DbType,
    value: &DbValue,
    op: PruningOp,
) -> Option<bool> {
    // min <= value, with MINVALUE below everything
    let min_le = |strict: bool| -> Option<bool> {
        let Some(min) = min else { return Some(true) };
        let ord = min.compare(value)?;
        Some(ord == Ordering::Less || (!strict && ord == Ordering::Equal))
    };
    // value < bound, with MAXVALUE above everything
    let below = |bound: Option<&DbValue>| -> Option<bool> {
        let Some(bound) = bound else { return Some(true) };
        Some(value.compare(bound)? == Ordering::Less)
    };

    match op {
        PruningOp::Eq => Some(min_le(false)? && below(max)?),
        PruningOp::Lt => min_le(true),
        PruningOp::Le => min_le(false),
        PruningOp::Ge => below(max),
        PruningOp::Gt => match max {
            None => Some(true),
            // the largest key in [min, max) is pred(max), but only when the
            // bound is written in the key's own discrete domain
            Some(max) => match max.predecessor().filter(|_| max.db_type() == Some(domain)) {
                Some(last) => below(Some(&last)),
                None => below(Some(max)),
            },
        },
        _ => Some(false),
    }
}

/// List pruning by set membership.
///
/// `NOT IN` keeps only partitions whose values are all outside the
/// candidate set.
#[must_use]
pub fn prune_list(partitions: &[PartitionDescriptor], value: &DbValue, op: PruningOp) -> PruneOutcome {
    let mut set = PruningBitset::new(partitions.len());
    let lists = partitions.iter().enumerate().filter_map(|(i, p)| match &p.bounds {
        PartitionBounds::List { values } => Some((i, values.as_slice())),
        _ => None,
    });

    match op {
        PruningOp::Eq | PruningOp::IsNull => {
            let mut lists = lists;
            let hit = if op == PruningOp::IsNull {
                lists.find(|(_, values)| values.iter().any(DbValue::is_null))
            } else {
                lists.find(|(_, values)| values.iter().any(|v| v.equals(value)))
            };
            match hit {
                Some((i, _)) => set.add(i),
                None => return PruneOutcome::NotMatched,
            }
        }
        PruningOp::In | PruningOp::NotIn => {
            if value.as_set().is_none() {
                return PruneOutcome::NotMatched;
            }
            for (i, values) in lists {
                let intersects = values.iter().any(|v| value.set_contains(v));
                if intersects == (op == PruningOp::In) {
                    set.add(i);
                }
            }
        }
        PruningOp::Lt | PruningOp::Le | PruningOp::Gt | PruningOp::Ge | PruningOp::Ne => {
            return PruneOutcome::NotMatched
        }
    }
    PruneOutcome::Matched(set)
}
