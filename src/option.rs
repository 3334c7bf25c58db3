use std::path::PathBuf;

use parquet::file::properties::WriterProperties;

use crate::{
    fs::{FileId, FileType},
    partition::{ColumnMapping, PartitionSpec},
};

const DEFAULT_TARGET_FILE_SIZE: u64 = 128 * 1024 * 1024;
const DEFAULT_MAX_COMMIT_RETRIES: usize = 10;

/// Configuration for a table handle.
#[derive(Debug, Clone)]
pub struct TableOption {
    pub(crate) path: PathBuf,
    pub(crate) partition_spec: PartitionSpec,
    pub(crate) column_mapping: ColumnMapping,
    pub(crate) target_file_size: u64,
    pub(crate) compaction_parallelism: usize,
    pub(crate) max_commit_retries: usize,
    pub(crate) write_parquet_option: Option<WriterProperties>,
}

impl<P> From<P> for TableOption
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        TableOption {
            path: path.into(),
            partition_spec: PartitionSpec::Unpartitioned,
            column_mapping: ColumnMapping::identity(),
            target_file_size: DEFAULT_TARGET_FILE_SIZE,
            compaction_parallelism: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            write_parquet_option: None,
        }
    }
}

impl TableOption {
    /// How the table is partitioned.
    pub fn partition_spec(self, partition_spec: PartitionSpec) -> Self {
        TableOption {
            partition_spec,
            ..self
        }
    }

    /// Logical-to-physical column name table for predicate resolution.
    pub fn column_mapping(self, column_mapping: ColumnMapping) -> Self {
        TableOption {
            column_mapping,
            ..self
        }
    }

    /// Target (maximum) size in bytes for compacted output files. Files at
    /// or above this size are never rewritten.
    pub fn target_file_size(self, target_file_size: u64) -> Self {
        TableOption {
            target_file_size,
            ..self
        }
    }

    /// Upper bound on concurrently running compaction jobs.
    pub fn compaction_parallelism(self, compaction_parallelism: usize) -> Self {
        TableOption {
            compaction_parallelism,
            ..self
        }
    }

    /// Retry budget for optimistic-commit conflicts.
    pub fn max_commit_retries(self, max_commit_retries: usize) -> Self {
        TableOption {
            max_commit_retries,
            ..self
        }
    }

    /// Parquet writer properties for data files written by this handle.
    pub fn write_parquet_option(self, write_parquet_option: WriterProperties) -> Self {
        TableOption {
            write_parquet_option: Some(write_parquet_option),
            ..self
        }
    }
}

impl TableOption {
    pub(crate) fn table_path(&self, gen: &FileId) -> PathBuf {
        self.path.join(format!("{}.{}", gen, FileType::Parquet))
    }

    pub(crate) fn version_path(&self) -> PathBuf {
        self.path.join(format!("version.{}", FileType::Log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_the_table_root() {
        let option = TableOption::from("/tmp/t");
        let gen = crate::fs::generate_file_id();
        assert_eq!(
            option.table_path(&gen),
            PathBuf::from(format!("/tmp/t/{}.parquet", gen))
        );
        assert_eq!(option.version_path(), PathBuf::from("/tmp/t/version.log"));
    }

    #[test]
    fn builder_overrides() {
        let option = TableOption::from("/tmp/t")
            .partition_spec(PartitionSpec::partitioned_by(["id"]))
            .target_file_size(1024)
            .compaction_parallelism(2)
            .max_commit_retries(3);
        assert_eq!(option.partition_spec.columns(), ["id".to_string()].as_slice());
        assert_eq!(option.target_file_size, 1024);
        assert_eq!(option.compaction_parallelism, 2);
        assert_eq!(option.max_commit_retries, 3);
    }
}
