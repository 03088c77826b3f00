//! Error types for partition pruning.
//!
//! Every pruning and placement routine returns [`Result`]; nothing in this
//! crate panics across module boundaries. Error codes follow the pattern
//! `PRUNE-XXX` so callers can surface them to clients unchanged.

use thiserror::Error;

use crate::partition::ClassId;

/// Result type alias for pruning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading partition metadata, pruning or
/// placing rows.
#[derive(Error, Debug)]
pub enum Error {
    /// No partition accepts the routing value of a row (PRUNE-001).
    ///
    /// Fatal for the row operation that raised it. Never retried and never
    /// redirected to a fallback partition.
    #[error("[PRUNE-001] No partition exists for value {value} of class {class}")]
    PartitionNotExist {
        /// Root class the row was routed through.
        class: ClassId,
        /// Rendered routing value.
        value: String,
    },

    /// Class is unknown to the catalog (PRUNE-002).
    #[error("[PRUNE-002] Class {0} not found")]
    ClassNotFound(ClassId),

    /// Catalog or heap layer failure (PRUNE-003).
    #[error("[PRUNE-003] Catalog error: {0}")]
    Catalog(String),

    /// Partition descriptors violate the partitioning scheme (PRUNE-004).
    #[error("[PRUNE-004] Invalid partition schema: {0}")]
    InvalidPartitionSchema(String),

    /// Partition count exceeds what a pruning bitset can hold (PRUNE-005).
    #[error("[PRUNE-005] Too many partitions: {count} (maximum {max})")]
    TooManyPartitions {
        /// Number of partitions found.
        count: usize,
        /// Supported maximum.
        max: usize,
    },

    /// Partition expression evaluation failed (PRUNE-006).
    #[error("[PRUNE-006] Evaluation error: {0}")]
    Evaluation(String),

    /// Operand types are incompatible (PRUNE-007).
    #[error("[PRUNE-007] Type mismatch: {0}")]
    TypeMismatch(String),

    /// Encoding or decoding of a stored stream failed (PRUNE-008).
    #[error("[PRUNE-008] Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (PRUNE-009).
    #[error("[PRUNE-009] Configuration error: {0}")]
    Config(String),

    /// IO error (PRUNE-010).
    #[error("[PRUNE-010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (PRUNE-011).
    ///
    /// Indicates a broken invariant. Please report if encountered.
    #[error("[PRUNE-011] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "PRUNE-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PartitionNotExist { .. } => "PRUNE-001",
            Self::ClassNotFound(_) => "PRUNE-002",
            Self::Catalog(_) => "PRUNE-003",
            Self::InvalidPartitionSchema(_) => "PRUNE-004",
            Self::TooManyPartitions { .. } => "PRUNE-005",
            Self::Evaluation(_) => "PRUNE-006",
            Self::TypeMismatch(_) => "PRUNE-007",
            Self::Serialization(_) => "PRUNE-008",
            Self::Config(_) => "PRUNE-009",
            Self::Io(_) => "PRUNE-010",
            Self::Internal(_) => "PRUNE-011",
        }
    }

    /// Returns true if the enclosing transaction may continue after this
    /// error.
    ///
    /// Schema and internal failures are not recoverable; a row that has no
    /// partition only fails its own statement.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidPartitionSchema(_) | Self::Internal(_) | Self::Serialization(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
