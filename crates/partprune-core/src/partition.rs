//! Partition descriptors.
//!
//! A partitioned table is described by an ordered descriptor list: position
//! 0 is the master entry carrying the partitioning scheme and the stored
//! partition expression, positions `1..=N` are the real partitions in their
//! stable catalog order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::DbValue;

/// Maximum number of real partitions a table may have.
pub const MAX_PARTITIONS: usize = 1024;

/// Identity of a class (table or partition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u64);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class:{}", self.0)
    }
}

/// Location of a class's heap storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeapFileId(pub u64);

/// Identity of a B-tree index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u64);

/// Representation (schema version) id used to interpret stored rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReprId(pub u32);

/// Attribute (column) id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrId(pub u32);

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr:{}", self.0)
    }
}

/// Partitioning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    /// Rows routed by `hash(key) mod N`.
    Hash,
    /// Rows routed by half-open value ranges.
    Range,
    /// Rows routed by explicit value lists.
    List,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => f.write_str("HASH"),
            Self::Range => f.write_str("RANGE"),
            Self::List => f.write_str("LIST"),
        }
    }
}

/// Bound values of a descriptor; interpretation depends on the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionBounds {
    /// Master entry: the encoded partition expression.
    Master {
        /// `bincode` stream of a [`crate::expr::PartitionExpression`].
        expression: Vec<u8>,
    },
    /// `[min, max)`; `None` stands for MINVALUE / MAXVALUE.
    Range {
        /// Inclusive lower bound, `None` = unbounded below.
        min: Option<DbValue>,
        /// Exclusive upper bound, `None` = unbounded above.
        max: Option<DbValue>,
    },
    /// Discrete values routed to the partition; may contain NULL.
    List {
        /// Member values.
        values: Vec<DbValue>,
    },
    /// Hash partitions store no values.
    Hash,
}

/// One entry of a table's descriptor list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    /// Class of this partition (the root class for the master entry).
    pub class_id: ClassId,
    /// Heap file holding the partition's rows.
    pub heap_id: HeapFileId,
    /// Partitioning strategy, identical across siblings.
    pub kind: PartitionKind,
    /// Kind-specific bound values.
    pub bounds: PartitionBounds,
    /// Representation id rows are written with.
    pub repr_id: ReprId,
}

impl PartitionDescriptor {
    /// Builds the master entry for a partitioned root class.
    #[must_use]
    pub fn master(
        class_id: ClassId,
        heap_id: HeapFileId,
        kind: PartitionKind,
        expression: Vec<u8>,
        repr_id: ReprId,
    ) -> Self {
        Self {
            class_id,
            heap_id,
            kind,
            bounds: PartitionBounds::Master { expression },
            repr_id,
        }
    }

    /// Returns the encoded expression if this is a master entry.
    #[must_use]
    pub fn expression_stream(&self) -> Option<&[u8]> {
        match &self.bounds {
            PartitionBounds::Master { expression } => Some(expression),
            _ => None,
        }
    }
}

/// Checks the structural invariants of a descriptor list.
///
/// The list must start with a master entry, hold between one and
/// [`MAX_PARTITIONS`] real partitions, share one partition kind, carry bounds
/// matching that kind, and (for RANGE and LIST) keep sibling bounds pairwise
/// disjoint.
///
/// # Errors
///
/// Returns [`Error::InvalidPartitionSchema`] or [`Error::TooManyPartitions`].
pub fn validate_partitions(partitions: &[PartitionDescriptor]) -> Result<()> {
    let Some((master, children)) = partitions.split_first() else {
        return Err(Error::InvalidPartitionSchema(
            "descriptor list is empty".to_string(),
        ));
    };
    if master.expression_stream().is_none() {
        return Err(Error::InvalidPartitionSchema(format!(
            "position 0 of {} is not a master entry",
            master.class_id
        )));
    }
    if children.is_empty() {
        return Err(Error::InvalidPartitionSchema(format!(
            "{} has a master entry but no partitions",
            master.class_id
        )));
    }
    if children.len() > MAX_PARTITIONS {
        return Err(Error::TooManyPartitions {
            count: children.len(),
            max: MAX_PARTITIONS,
        });
    }

    for child in children {
        if child.kind != master.kind {
            return Err(Error::InvalidPartitionSchema(format!(
                "{} is {} but its root is {}",
                child.class_id, child.kind, master.kind
            )));
        }
        let shape_ok = matches!(
            (&child.bounds, master.kind),
            (PartitionBounds::Range { .. }, PartitionKind::Range)
                | (PartitionBounds::List { .. }, PartitionKind::List)
                | (PartitionBounds::Hash, PartitionKind::Hash)
        );
        if !shape_ok {
            return Err(Error::InvalidPartitionSchema(format!(
                "{} bounds do not match {} partitioning",
                child.class_id, master.kind
            )));
        }
    }

    match master.kind {
        PartitionKind::Range => check_ranges_disjoint(children),
        PartitionKind::List => check_lists_disjoint(children),
        PartitionKind::Hash => Ok(()),
    }
}

fn check_ranges_disjoint(children: &[PartitionDescriptor]) -> Result<()> {
    let ranges: Vec<(&Option<DbValue>, &Option<DbValue>, ClassId)> = children
        .iter()
        .filter_map(|c| match &c.bounds {
            PartitionBounds::Range { min, max } => Some((min, max, c.class_id)),
            _ => None,
        })
        .collect();

    for (i, (min_a, max_a, id_a)) in ranges.iter().enumerate() {
        if let (Some(lo), Some(hi)) = (min_a, max_a) {
            if lo.compare(hi) != Some(Ordering::Less) {
                return Err(Error::InvalidPartitionSchema(format!(
                    "{id_a} has an empty range [{lo}, {hi})"
                )));
            }
        }
        for (min_b, max_b, id_b) in &ranges[i + 1..] {
            // [a0, a1) and [b0, b1) overlap iff a0 < b1 and b0 < a1
            if lower_below_upper(min_a, max_b) && lower_below_upper(min_b, max_a) {
                return Err(Error::InvalidPartitionSchema(format!(
                    "ranges of {id_a} and {id_b} overlap"
                )));
            }
        }
    }
    Ok(())
}

fn lower_below_upper(lower: &Option<DbValue>, upper: &Option<DbValue>) -> bool {
    match (lower, upper) {
        (None, _) | (_, None) => true,
        (Some(lo), Some(hi)) => lo.compare(hi) == Some(Ordering::Less),
    }
}

fn check_lists_disjoint(children: &[PartitionDescriptor]) -> Result<()> {
    let mut seen: Vec<(&DbValue, ClassId)> = Vec::new();
    for child in children {
        let PartitionBounds::List { values } = &child.bounds else {
            continue;
        };
        for value in values {
            if let Some((_, owner)) = seen.iter().find(|(v, _)| v.equals(value)) {
                return Err(Error::InvalidPartitionSchema(format!(
                    "value {value} is listed by both {owner} and {}",
                    child.class_id
                )));
            }
            seen.push((value, child.class_id));
        }
    }
    Ok(())
}
