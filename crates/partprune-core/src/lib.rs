//! # `partprune` Core
//!
//! Partition pruning for a relational storage engine.
//!
//! Given a search predicate or index key ranges over a partitioned table,
//! the engine computes the smallest set of partitions a scan must visit.
//! Given a row being written, it computes the one partition that must hold
//! it. Tables are partitioned by HASH, RANGE or LIST on an arbitrary
//! partitioning expression.
//!
//! ## Features
//!
//! - **Three strategies**: hash buckets, half-open ranges, value lists
//! - **Predicate matching**: AND/OR trees, `IN`, `NOT IN`, `IS NULL`,
//!   constant folding of parameters and pseudo-constants
//! - **Index scans**: multi-column key ranges narrowed per key position
//! - **Shared metadata cache**: first-writer-wins, bypassed during schema
//!   changes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use partprune_core::{
//!     catalog::{InMemoryCatalog, ReadOnlyTransaction},
//!     AccessSpec, ClassId, DbType, Expr, PartitionPruner, Predicate, PruneConfig, RelOp,
//! };
//!
//! let catalog = Arc::new(InMemoryCatalog::from_json(&fixture)?);
//! let pruner = PartitionPruner::new(catalog, PruneConfig::default())?;
//!
//! // SELECT ... FROM orders WHERE order_id = 15
//! let pred = Predicate::compare(Expr::attr(1, DbType::Int), RelOp::Eq, Expr::constant(15));
//! let mut spec = AccessSpec::heap_scan(ClassId(100), Some(pred));
//! pruner.prune_spec(&ReadOnlyTransaction, &mut spec, &[])?;
//! assert_eq!(spec.partitions.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::wildcard_imports)]

pub mod bitset;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod expr;
pub mod partition;
pub mod predicate;
mod pruner;
pub mod pruning;
pub mod value;

pub use bitset::PruningBitset;
pub use cache::{CacheEntry, CacheStats, PartitionCache};
pub use catalog::{Catalog, InMemoryCatalog, Record, TransactionView};
pub use config::{ConfigError, PruneConfig};
pub use error::{Error, Result};
pub use expr::{ArithOp, EvalContext, Expr, PartitionExpression, Row};
pub use partition::{
    AttrId, ClassId, HeapFileId, IndexId, PartitionBounds, PartitionDescriptor, PartitionKind,
    ReprId, MAX_PARTITIONS,
};
pub use predicate::{Predicate, PruningOp, Quantifier, RelOp};
pub use pruner::PartitionPruner;
pub use pruning::{
    AccessMethod, AccessSpec, IndexScan, KeyRange, PartitionHandle, PlacementTarget,
    PruneOutcome, PruningContext, PruningEnv, RangeType,
};
pub use value::{DbType, DbValue};
