pub(crate) mod edit;
pub(crate) mod set;

use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::Arc,
};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    partition::PartitionKey,
    predicate::ResolvedPredicate,
    serdes::{Decode, Encode},
    version::edit::VersionEdit,
};

/// Metadata for one immutable data file recorded in the transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: String,
    size: u64,
    rows: Option<u64>,
    partition: PartitionKey,
    modified: u64,
}

impl FileEntry {
    pub(crate) fn new(
        path: String,
        size: u64,
        rows: Option<u64>,
        partition: PartitionKey,
        modified: u64,
    ) -> Self {
        Self {
            path,
            size,
            rows,
            partition,
            modified,
        }
    }

    /// File name relative to the table root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Row count, when known at write time.
    pub fn rows(&self) -> Option<u64> {
        self.rows
    }

    /// The partition this file belongs to.
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Opaque modification tag carried for log bookkeeping.
    pub fn modified(&self) -> u64 {
        self.modified
    }
}

impl Encode for FileEntry {
    async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.path.encode(writer).await?;
        self.size.encode(writer).await?;
        self.rows.encode(writer).await?;
        self.partition.encode(writer).await?;
        self.modified.encode(writer).await
    }

    fn size(&self) -> usize {
        Encode::size(&self.path)
            + Encode::size(&self.size)
            + Encode::size(&self.rows)
            + Encode::size(&self.partition)
            + Encode::size(&self.modified)
    }
}

impl Decode for FileEntry {
    async fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(FileEntry {
            path: String::decode(reader).await?,
            size: u64::decode(reader).await?,
            rows: Option::<u64>::decode(reader).await?,
            partition: PartitionKey::decode(reader).await?,
            modified: u64::decode(reader).await?,
        })
    }
}

/// Shared handle to an immutable snapshot.
pub type VersionRef = Arc<Version>;

/// An immutable, versioned view of the table's live file set.
///
/// A new `Version` is produced only by replaying the log at open or by a
/// successful commit; holders of an older snapshot keep seeing a consistent
/// (if stale) view. The tombstone index records at which version each
/// removed path left the table and backs optimistic conflict checks.
#[derive(Debug, Clone, Default)]
pub struct Version {
    version: u64,
    files: BTreeMap<String, FileEntry>,
    tombstones: HashMap<String, u64>,
}

impl Version {
    /// The committed version number of this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Live files, in path order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    /// Number of live files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whether `path` is live in this snapshot.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// The version at which `path` was removed, if it was.
    pub(crate) fn removed_at(&self, path: &str) -> Option<u64> {
        self.tombstones.get(path).copied()
    }

    /// Apply a committed edit batch, producing the snapshot for `version`.
    pub(crate) fn apply(&self, version: u64, edits: &[VersionEdit]) -> Version {
        let mut files = self.files.clone();
        let mut tombstones = self.tombstones.clone();
        for edit in edits {
            match edit {
                VersionEdit::Add { entry } => {
                    files.insert(entry.path.clone(), entry.clone());
                }
                VersionEdit::Remove { path, version } => {
                    if files.remove(path).is_some() {
                        tombstones.insert(path.clone(), *version);
                    }
                }
            }
        }
        Version {
            version,
            files,
            tombstones,
        }
    }

    /// Live files matching `predicate`, grouped by partition.
    ///
    /// With no predicate every live file is eligible. Evaluation is a pure
    /// function of partition keys; file contents are never consulted.
    pub(crate) fn select(
        &self,
        predicate: Option<&ResolvedPredicate>,
    ) -> BTreeMap<PartitionKey, Vec<FileEntry>> {
        let mut selected: BTreeMap<PartitionKey, Vec<FileEntry>> = BTreeMap::new();
        for entry in self.files.values() {
            if predicate.map_or(true, |predicate| predicate.matches(&entry.partition)) {
                selected
                    .entry(entry.partition.clone())
                    .or_default()
                    .push(entry.clone());
            }
        }
        selected
    }
}

/// Failures reading or writing the transaction log.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Log file could not be read or written.
    #[error("version log io error: {0}")]
    Io(#[from] std::io::Error),
    /// Replay found frames that cannot belong to a well-formed log.
    #[error("version log corrupted: {0}")]
    Corrupted(String),
}
