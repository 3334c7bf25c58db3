use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::TryStreamExt;
use parquet::arrow::{async_reader::ParquetRecordBatchStreamBuilder, AsyncArrowWriter};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info};

use crate::{
    compaction::{
        commit::CommitCoordinator, executor::CompactionExecutor, planner, scheduler,
        CompactionError, OptimizeMetrics,
    },
    fs::{generate_file_id, unix_timestamp_millis, FileType},
    option::TableOption,
    partition::PartitionKey,
    predicate::PartitionPredicate,
    version::{
        edit::VersionEdit,
        set::{CommitOutcome, VersionSet},
        FileEntry, VersionError, VersionRef,
    },
};

/// Failures on the table's read/write surface.
#[derive(Debug, Error)]
pub enum TableError {
    /// Replaying or appending the transaction log failed.
    #[error("table version error: {0}")]
    Version(#[from] VersionError),
    /// A data file could not be read or written.
    #[error("table io error on {path}: {source}")]
    Io {
        /// Offending file, relative to the table root.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A parquet data file could not be encoded or decoded.
    #[error("table parquet error on {path}: {source}")]
    Parquet {
        /// Offending file, relative to the table root.
        path: String,
        /// Underlying error.
        #[source]
        source: parquet::errors::ParquetError,
    },
    /// `append` was called without any record batches.
    #[error("append requires at least one record batch")]
    EmptyAppend,
    /// The append's partition key does not match the table's partitioning.
    #[error("partition key columns {got:?} do not match the table partition columns {expected:?}")]
    PartitionMismatch {
        /// The table's partition columns.
        expected: Vec<String>,
        /// Columns carried by the offending key.
        got: Vec<String>,
    },
    /// The append lost the commit race more times than the retry budget.
    #[error("append lost the commit race after {0} attempts")]
    AppendContention(usize),
}

/// Handle to one versioned table: immutable parquet data files plus an
/// append-only transaction log of add/remove actions.
///
/// Handles are cheap to clone through `Arc` sharing and safe to use from
/// concurrent tasks; all writes go through the log's single-writer
/// admission step.
pub struct Table {
    option: Arc<TableOption>,
    version_set: VersionSet,
}

impl Table {
    /// Open the table at `option.path`, creating the directory and an empty
    /// log on first open, and replay the log into the current snapshot.
    pub async fn open(option: TableOption) -> Result<Self, TableError> {
        let option = Arc::new(option);
        let version_set = VersionSet::new(&option).await?;
        let current = version_set.current().await;
        info!(
            path = %option.path.display(),
            version = current.version(),
            files = current.file_count(),
            "table opened"
        );
        Ok(Self {
            option,
            version_set,
        })
    }

    /// The current snapshot. Holders keep a consistent view of this version
    /// no matter what commits afterwards.
    pub async fn current(&self) -> VersionRef {
        self.version_set.current().await
    }

    /// Write `batches` as one immutable data file in `partition` and commit
    /// the add action.
    pub async fn append(
        &self,
        partition: PartitionKey,
        batches: &[RecordBatch],
    ) -> Result<VersionRef, TableError> {
        let expected = self.option.partition_spec.columns();
        if !partition
            .column_names()
            .eq(expected.iter().map(String::as_str))
        {
            return Err(TableError::PartitionMismatch {
                expected: expected.to_vec(),
                got: partition.column_names().map(str::to_string).collect(),
            });
        }
        let first = batches.first().ok_or(TableError::EmptyAppend)?;

        let gen = generate_file_id();
        let name = format!("{}.{}", gen, FileType::Parquet);
        let path = self.option.table_path(&gen);
        let file = File::create(&path).await.map_err(|source| TableError::Io {
            path: name.clone(),
            source,
        })?;
        let mut writer = AsyncArrowWriter::try_new(
            file,
            first.schema(),
            self.option.write_parquet_option.clone(),
        )
        .map_err(|source| TableError::Parquet {
            path: name.clone(),
            source,
        })?;
        let mut rows = 0u64;
        for batch in batches {
            rows += batch.num_rows() as u64;
            writer
                .write(batch)
                .await
                .map_err(|source| TableError::Parquet {
                    path: name.clone(),
                    source,
                })?;
        }
        writer.close().await.map_err(|source| TableError::Parquet {
            path: name.clone(),
            source,
        })?;
        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|source| TableError::Io {
                path: name.clone(),
                source,
            })?
            .len();

        let entry = FileEntry::new(name, size, Some(rows), partition, unix_timestamp_millis());
        // Adds never touch existing files, so losing the version slot only
        // means replaying the commit against the fresher snapshot.
        for _ in 0..=self.option.max_commit_retries {
            let current = self.version_set.current().await;
            let outcome = self
                .version_set
                .commit(
                    current.version(),
                    vec![VersionEdit::Add {
                        entry: entry.clone(),
                    }],
                )
                .await?;
            match outcome {
                CommitOutcome::Committed(next) => {
                    debug!(version = next.version(), rows, "append committed");
                    return Ok(next);
                }
                CommitOutcome::Superseded(_) => continue,
            }
        }
        Err(TableError::AppendContention(
            self.option.max_commit_retries + 1,
        ))
    }

    /// Stream every live row of the current snapshot.
    pub async fn scan(&self) -> impl Stream<Item = Result<RecordBatch, TableError>> {
        let snapshot = self.version_set.current().await;
        let files: Vec<FileEntry> = snapshot.files().cloned().collect();
        self.scan_files(files)
    }

    /// Stream the live rows of one partition of the current snapshot.
    pub async fn scan_partition(
        &self,
        partition: &PartitionKey,
    ) -> impl Stream<Item = Result<RecordBatch, TableError>> {
        let snapshot = self.version_set.current().await;
        let files: Vec<FileEntry> = snapshot
            .files()
            .filter(|entry| entry.partition() == partition)
            .cloned()
            .collect();
        self.scan_files(files)
    }

    fn scan_files(
        &self,
        files: Vec<FileEntry>,
    ) -> impl Stream<Item = Result<RecordBatch, TableError>> {
        let root = self.option.path.clone();
        try_stream! {
            for entry in files {
                let path = root.join(entry.path());
                let file = File::open(&path).await.map_err(|source| TableError::Io {
                    path: entry.path().to_string(),
                    source,
                })?;
                let builder = ParquetRecordBatchStreamBuilder::new(file).await.map_err(
                    |source| TableError::Parquet {
                        path: entry.path().to_string(),
                        source,
                    },
                )?;
                let mut stream = builder.build().map_err(|source| TableError::Parquet {
                    path: entry.path().to_string(),
                    source,
                })?;
                while let Some(batch) =
                    stream
                        .try_next()
                        .await
                        .map_err(|source| TableError::Parquet {
                            path: entry.path().to_string(),
                            source,
                        })?
                {
                    yield batch;
                }
            }
        }
    }

    /// Rewrite small files into fewer, larger ones and commit the change
    /// atomically.
    ///
    /// With a predicate only the matching partitions are considered; the
    /// predicate must reference partition columns exclusively and is
    /// validated before any file is touched. Returns the resulting version
    /// and the number of files removed and added; a run that finds nothing
    /// to rewrite commits nothing and reports the unchanged version.
    pub async fn optimize(
        &self,
        predicate: Option<PartitionPredicate>,
    ) -> Result<OptimizeMetrics, CompactionError> {
        let resolved = match predicate {
            Some(predicate) => Some(predicate.resolve(
                &self.option.partition_spec,
                &self.option.column_mapping,
            )?),
            None => None,
        };

        let snapshot = self.version_set.current().await;
        let selected = snapshot.select(resolved.as_ref());
        let units = planner::plan(selected, self.option.target_file_size);
        let rewrites: Vec<_> = units
            .into_iter()
            .filter(|unit| !unit.already_optimal)
            .collect();
        if rewrites.is_empty() {
            debug!(version = snapshot.version(), "optimize found nothing to rewrite");
            return Ok(OptimizeMetrics {
                version: snapshot.version(),
                files_removed: 0,
                files_added: 0,
            });
        }
        info!(
            version = snapshot.version(),
            units = rewrites.len(),
            "optimize planned"
        );

        let executor = Arc::new(CompactionExecutor::new(self.option.clone()));
        let results = scheduler::run_units(
            rewrites,
            executor,
            self.option.compaction_parallelism,
        )
        .await?;

        CommitCoordinator::new(&self.version_set, self.option.max_commit_retries)
            .commit(snapshot, &results)
            .await
    }
}
