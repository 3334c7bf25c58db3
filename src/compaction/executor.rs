//! Rewrites one compaction unit into a single consolidated parquet file.

use std::sync::Arc;

use futures_util::TryStreamExt;
use parquet::arrow::{async_reader::ParquetRecordBatchStreamBuilder, AsyncArrowWriter};
use tokio::fs::File;
use tracing::debug;

use crate::{
    compaction::{error::CompactionError, planner::CompactionUnit},
    fs::{generate_file_id, unix_timestamp_millis, FileType},
    option::TableOption,
    version::FileEntry,
};

/// Output of one successful rewrite job.
#[derive(Debug)]
pub(crate) struct RewriteResult {
    pub(crate) unit: CompactionUnit,
    pub(crate) output: FileEntry,
}

/// Executes rewrite jobs against the table's data files.
///
/// The executor owns output materialization: it allocates the output file
/// id, streams every input's record batches into one writer, and reports
/// the finished [`FileEntry`]. Row order across inputs is preserved as
/// concatenation; the format assumes no file-internal ordering.
pub(crate) struct CompactionExecutor {
    option: Arc<TableOption>,
}

impl CompactionExecutor {
    pub(crate) fn new(option: Arc<TableOption>) -> Self {
        Self { option }
    }

    pub(crate) async fn execute(
        &self,
        unit: CompactionUnit,
    ) -> Result<RewriteResult, CompactionError> {
        let mut readers = Vec::with_capacity(unit.inputs.len());
        for input in &unit.inputs {
            let path = self.option.path.join(input.path());
            let file = File::open(&path).await.map_err(|source| CompactionError::Io {
                path: input.path().to_string(),
                source,
            })?;
            let builder = ParquetRecordBatchStreamBuilder::new(file)
                .await
                .map_err(|source| CompactionError::Parquet {
                    path: input.path().to_string(),
                    source,
                })?;
            readers.push((input.path().to_string(), builder));
        }
        let schema = readers
            .first()
            .ok_or(CompactionError::NoInputs)?
            .1
            .schema()
            .clone();

        let gen = generate_file_id();
        let output_name = format!("{}.{}", gen, FileType::Parquet);
        let output_path = self.option.table_path(&gen);
        let output = File::create(&output_path)
            .await
            .map_err(|source| CompactionError::Io {
                path: output_name.clone(),
                source,
            })?;
        let mut writer =
            AsyncArrowWriter::try_new(output, schema, self.option.write_parquet_option.clone())
                .map_err(|source| CompactionError::Parquet {
                    path: output_name.clone(),
                    source,
                })?;

        let mut rows = 0u64;
        for (path, builder) in readers {
            let mut stream = builder
                .build()
                .map_err(|source| CompactionError::Parquet {
                    path: path.clone(),
                    source,
                })?;
            while let Some(batch) = stream
                .try_next()
                .await
                .map_err(|source| CompactionError::Parquet {
                    path: path.clone(),
                    source,
                })?
            {
                rows += batch.num_rows() as u64;
                writer
                    .write(&batch)
                    .await
                    .map_err(|source| CompactionError::Parquet {
                        path: output_name.clone(),
                        source,
                    })?;
            }
        }
        writer
            .close()
            .await
            .map_err(|source| CompactionError::Parquet {
                path: output_name.clone(),
                source,
            })?;

        let size = tokio::fs::metadata(&output_path)
            .await
            .map_err(|source| CompactionError::Io {
                path: output_name.clone(),
                source,
            })?
            .len();
        debug!(
            partition = %unit.partition,
            inputs = unit.inputs.len(),
            output = %output_name,
            rows,
            size,
            "compaction unit rewritten"
        );

        let output = FileEntry::new(
            output_name,
            size,
            Some(rows),
            unit.partition.clone(),
            unix_timestamp_millis(),
        );
        Ok(RewriteResult { unit, output })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::Int64Array,
        datatypes::{DataType, Field, Schema},
        record_batch::RecordBatch,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::partition::PartitionKey;

    async fn write_input(option: &TableOption, values: &[i64]) -> FileEntry {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "v",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(values.to_vec()))],
        )
        .unwrap();

        let gen = generate_file_id();
        let name = format!("{}.{}", gen, FileType::Parquet);
        let file = File::create(option.table_path(&gen)).await.unwrap();
        let mut writer = AsyncArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).await.unwrap();
        writer.close().await.unwrap();

        let size = tokio::fs::metadata(option.table_path(&gen)).await.unwrap().len();
        FileEntry::new(
            name,
            size,
            Some(values.len() as u64),
            PartitionKey::default(),
            0,
        )
    }

    #[tokio::test]
    async fn unit_rewrites_to_one_file_with_all_rows() {
        let temp_dir = TempDir::new().unwrap();
        let option = Arc::new(TableOption::from(temp_dir.path()));
        let a = write_input(&option, &[1, 2, 3]).await;
        let b = write_input(&option, &[4, 5, 6]).await;

        let executor = CompactionExecutor::new(option.clone());
        let unit = CompactionUnit {
            partition: PartitionKey::default(),
            inputs: vec![a, b],
            already_optimal: false,
        };
        let result = executor.execute(unit).await.unwrap();
        assert_eq!(result.output.rows(), Some(6));
        assert!(result.output.size() > 0);

        let file = File::open(option.path.join(result.output.path()))
            .await
            .unwrap();
        let stream = ParquetRecordBatchStreamBuilder::new(file)
            .await
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<_> = stream.try_collect().await.unwrap();
        let mut values: Vec<i64> = batches
            .iter()
            .flat_map(|batch| {
                batch
                    .column(0)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .values()
                    .to_vec()
            })
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn missing_input_fails_with_its_path() {
        let temp_dir = TempDir::new().unwrap();
        let option = Arc::new(TableOption::from(temp_dir.path()));
        let executor = CompactionExecutor::new(option);

        let unit = CompactionUnit {
            partition: PartitionKey::default(),
            inputs: vec![FileEntry::new(
                "gone.parquet".into(),
                10,
                Some(1),
                PartitionKey::default(),
                0,
            )],
            already_optimal: false,
        };
        let err = executor.execute(unit).await.unwrap_err();
        match err {
            CompactionError::Io { path, .. } => assert_eq!(path, "gone.parquet"),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
