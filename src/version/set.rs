use std::{io::SeekFrom, sync::Arc};

use async_lock::RwLock;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::{
    option::TableOption,
    version::{
        edit::{LogRecord, VersionEdit},
        Version, VersionError, VersionRef,
    },
};

pub(crate) struct VersionSetInner {
    current: VersionRef,
    log: File,
}

/// Owner of the transaction log and the current snapshot.
///
/// All commits funnel through [`VersionSet::commit`], which is the
/// single-writer admission step: the log is only ever appended under the
/// write lock, and a commit is admitted only if the snapshot it validated
/// against is still current.
pub(crate) struct VersionSet {
    inner: Arc<RwLock<VersionSetInner>>,
}

impl Clone for VersionSet {
    fn clone(&self) -> Self {
        VersionSet {
            inner: self.inner.clone(),
        }
    }
}

/// Result of one commit attempt.
pub(crate) enum CommitOutcome {
    /// The edit batch was appended; this is the new current snapshot.
    Committed(VersionRef),
    /// Another writer claimed the version slot first; carries the snapshot
    /// that superseded the caller's read version.
    Superseded(VersionRef),
}

impl VersionSet {
    /// Open (or create) the log under `option.path` and replay it into the
    /// current snapshot. A torn tail frame is truncated away.
    pub(crate) async fn new(option: &TableOption) -> Result<Self, VersionError> {
        tokio::fs::create_dir_all(&option.path).await?;
        let mut log = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(option.version_path())
            .await?;

        let mut bytes = Vec::new();
        log.read_to_end(&mut bytes).await?;
        let total = bytes.len();
        let mut reader = bytes.as_slice();
        let mut current = Version::default();
        let mut replayed = 0usize;
        while let Some(record) = LogRecord::read_from(&mut reader).await? {
            if record.version != current.version() + 1 {
                return Err(VersionError::Corrupted(format!(
                    "log version {} follows {}",
                    record.version,
                    current.version()
                )));
            }
            current = current.apply(record.version, &record.edits);
            replayed = total - reader.len();
        }
        if replayed < total {
            warn!(
                valid = replayed,
                total, "version log has a torn tail; truncating"
            );
            log.set_len(replayed as u64).await?;
        }
        log.seek(SeekFrom::End(0)).await?;
        debug!(version = current.version(), files = current.file_count(), "version log replayed");

        Ok(VersionSet {
            inner: Arc::new(RwLock::new(VersionSetInner {
                current: Arc::new(current),
                log,
            })),
        })
    }

    pub(crate) async fn current(&self) -> VersionRef {
        self.inner.read().await.current.clone()
    }

    /// Attempt to append `edits` as the version after `read_version`.
    ///
    /// Admission is mutually exclusive: under the write lock the current
    /// version must still equal `read_version`, otherwise the slot was
    /// claimed by a concurrent writer and `Superseded` is returned so the
    /// caller can re-validate against the fresher snapshot.
    pub(crate) async fn commit(
        &self,
        read_version: u64,
        edits: Vec<VersionEdit>,
    ) -> Result<CommitOutcome, VersionError> {
        let mut guard = self.inner.write().await;
        if guard.current.version() != read_version {
            return Ok(CommitOutcome::Superseded(guard.current.clone()));
        }

        let record = LogRecord {
            version: read_version + 1,
            edits,
        };
        record.write_to(&mut guard.log).await?;
        guard.log.flush().await?;
        guard.log.sync_data().await?;

        let next = Arc::new(guard.current.apply(record.version, &record.edits));
        guard.current = next.clone();
        Ok(CommitOutcome::Committed(next))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{partition::PartitionKey, version::tests::entry, TableOption};

    fn add(path: &str) -> VersionEdit {
        VersionEdit::Add {
            entry: entry(path, 64, PartitionKey::default()),
        }
    }

    #[tokio::test]
    async fn commit_advances_by_exactly_one() {
        let temp_dir = TempDir::new().unwrap();
        let option = TableOption::from(temp_dir.path());
        let set = VersionSet::new(&option).await.unwrap();

        let current = set.current().await;
        assert_eq!(current.version(), 0);

        let committed = set
            .commit(current.version(), vec![add("a.parquet")])
            .await
            .unwrap();
        let next = match committed {
            CommitOutcome::Committed(next) => next,
            CommitOutcome::Superseded(_) => panic!("no concurrent writer"),
        };
        assert_eq!(next.version(), 1);
        assert_eq!(set.current().await.version(), 1);
    }

    #[tokio::test]
    async fn stale_read_version_is_superseded() {
        let temp_dir = TempDir::new().unwrap();
        let option = TableOption::from(temp_dir.path());
        let set = VersionSet::new(&option).await.unwrap();

        set.commit(0, vec![add("a.parquet")]).await.unwrap();
        let outcome = set.commit(0, vec![add("b.parquet")]).await.unwrap();
        match outcome {
            CommitOutcome::Superseded(current) => assert_eq!(current.version(), 1),
            CommitOutcome::Committed(_) => panic!("version slot 1 was already claimed"),
        }
        // The losing batch left no trace.
        assert!(!set.current().await.contains("b.parquet"));
    }

    #[tokio::test]
    async fn reopen_replays_the_log() {
        let temp_dir = TempDir::new().unwrap();
        let option = TableOption::from(temp_dir.path());
        {
            let set = VersionSet::new(&option).await.unwrap();
            set.commit(0, vec![add("a.parquet")]).await.unwrap();
            set.commit(
                1,
                vec![
                    add("b.parquet"),
                    VersionEdit::Remove {
                        path: "a.parquet".into(),
                        version: 2,
                    },
                ],
            )
            .await
            .unwrap();
        }

        let set = VersionSet::new(&option).await.unwrap();
        let current = set.current().await;
        assert_eq!(current.version(), 2);
        assert_eq!(current.file_count(), 1);
        assert!(current.contains("b.parquet"));
        assert_eq!(current.removed_at("a.parquet"), Some(2));
    }

    #[tokio::test]
    async fn torn_tail_is_truncated_on_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let option = TableOption::from(temp_dir.path());
        {
            let set = VersionSet::new(&option).await.unwrap();
            set.commit(0, vec![add("a.parquet")]).await.unwrap();
            set.commit(1, vec![add("b.parquet")]).await.unwrap();
        }
        // Chop into the middle of the second frame.
        let log_path = option.version_path();
        let bytes = std::fs::read(&log_path).unwrap();
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&log_path)
            .unwrap();
        file.set_len(bytes.len() as u64 - 5).unwrap();

        let set = VersionSet::new(&option).await.unwrap();
        let current = set.current().await;
        assert_eq!(current.version(), 1);
        assert!(current.contains("a.parquet"));
        assert!(!current.contains("b.parquet"));

        // The next commit lands cleanly after the truncated tail.
        set.commit(1, vec![add("c.parquet")]).await.unwrap();
        let set = VersionSet::new(&option).await.unwrap();
        assert_eq!(set.current().await.version(), 2);
        assert!(set.current().await.contains("c.parquet"));
    }
}
