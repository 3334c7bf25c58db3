#![deny(missing_docs)]
//! Small-file compaction (OPTIMIZE) engine for a versioned lake table.
//!
//! A table is a directory of immutable parquet data files plus an
//! append-only transaction log of add/remove actions. Replaying the log
//! yields an immutable [`Version`] snapshot of the live file set; commits
//! advance the version by exactly one through an optimistic-concurrency
//! protocol that detects conflicting writers at commit time and retries
//! within a bounded budget.
//!
//! [`Table::optimize`] reduces the number of small files — optionally only
//! within partitions selected by a [`PartitionPredicate`] — by bin packing
//! them into size-bounded units, rewriting each unit's rows into one larger
//! file on a bounded worker pool, and committing the whole rewrite as a
//! single atomic transaction. Logical content is preserved exactly; files
//! already at the target size are never rewritten.

mod compaction;
mod fs;
mod option;
mod partition;
mod predicate;
mod serdes;
mod table;
mod version;

pub use crate::{
    compaction::{CompactionError, OptimizeMetrics},
    option::TableOption,
    partition::{ColumnMapping, PartitionKey, PartitionSpec, PartitionValue},
    predicate::{PartitionPredicate, PredicateError, ResolvedPredicate},
    table::{Table, TableError},
    version::{FileEntry, Version, VersionError, VersionRef},
};
