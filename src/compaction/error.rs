use thiserror::Error;

use crate::{predicate::PredicateError, version::VersionError};

/// Failures surfaced by an OPTIMIZE run.
///
/// Every variant leaves the table at its prior committed version; nothing is
/// ever partially committed.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// The predicate referenced columns the table is not partitioned by.
    /// Raised before any file is touched.
    #[error(transparent)]
    Predicate(#[from] PredicateError),
    /// Reading or writing a data file failed.
    #[error("compaction io error on {path}: {source}")]
    Io {
        /// Offending file, relative to the table root.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Decoding or encoding a parquet data file failed.
    #[error("compaction parquet error on {path}: {source}")]
    Parquet {
        /// Offending file, relative to the table root.
        path: String,
        /// Underlying error.
        #[source]
        source: parquet::errors::ParquetError,
    },
    /// The optimistic commit could not be reconciled within the retry
    /// budget; the caller may re-invoke OPTIMIZE against the new snapshot.
    #[error(
        "compaction commit conflict after {attempts} attempts; \
         files no longer current: {paths:?}"
    )]
    CommitConflict {
        /// Commit attempts made before giving up.
        attempts: usize,
        /// Files this run intended to remove that a concurrent transaction
        /// already removed.
        paths: Vec<String>,
    },
    /// A compaction unit had no input files.
    #[error("compaction unit has no inputs")]
    NoInputs,
    /// The scheduler's task queue closed unexpectedly.
    #[error("compaction channel is closed")]
    ChannelClose,
    /// The worker pool failed to start or complete cleanly.
    #[error("compaction worker pool failure: {0}")]
    Scheduling(#[from] tokio::task::JoinError),
    /// Appending to or replaying the transaction log failed.
    #[error("compaction version error: {0}")]
    Version(#[from] VersionError),
}
