use std::{io, mem::size_of};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    serdes::{Decode, Encode},
    version::FileEntry,
};

/// One tagged action in the transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VersionEdit {
    /// A data file became live.
    Add { entry: FileEntry },
    /// A data file was removed at `version` (its tombstone version).
    Remove { path: String, version: u64 },
}

impl Encode for VersionEdit {
    async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            VersionEdit::Add { entry } => {
                0u8.encode(writer).await?;
                entry.encode(writer).await
            }
            VersionEdit::Remove { path, version } => {
                1u8.encode(writer).await?;
                path.encode(writer).await?;
                version.encode(writer).await
            }
        }
    }

    fn size(&self) -> usize {
        size_of::<u8>()
            + match self {
                VersionEdit::Add { entry } => Encode::size(entry),
                VersionEdit::Remove { path, version } => {
                    Encode::size(path) + Encode::size(version)
                }
            }
    }
}

impl Decode for VersionEdit {
    async fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(reader).await? {
            0 => Ok(VersionEdit::Add {
                entry: FileEntry::decode(reader).await?,
            }),
            1 => Ok(VersionEdit::Remove {
                path: String::decode(reader).await?,
                version: u64::decode(reader).await?,
            }),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid version edit tag",
            )),
        }
    }
}

/// One committed transaction in the log: the version it produced plus its
/// edit batch, stored as a length-prefixed, CRC32-checked frame so replay
/// can stop cleanly at a torn tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogRecord {
    pub(crate) version: u64,
    pub(crate) edits: Vec<VersionEdit>,
}

/// Frames larger than this cannot come from a well-formed log.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

impl LogRecord {
    pub(crate) async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut payload = Vec::with_capacity(self.payload_size());
        {
            let mut cursor = io::Cursor::new(&mut payload);
            self.version.encode(&mut cursor).await?;
            (self.edits.len() as u32).encode(&mut cursor).await?;
            for edit in &self.edits {
                edit.encode(&mut cursor).await?;
            }
        }
        (payload.len() as u32).encode(writer).await?;
        writer.write_all(&payload).await?;
        crc32fast::hash(&payload).encode(writer).await
    }

    /// Read the next frame. `Ok(None)` means clean end of log or a torn or
    /// corrupt tail frame; the caller truncates anything that follows.
    pub(crate) async fn read_from<R>(reader: &mut R) -> io::Result<Option<Self>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = match u32::decode(reader).await {
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        };
        if len == 0 || len > MAX_FRAME_LEN {
            return Ok(None);
        }
        let mut payload = vec![0u8; len as usize];
        if let Err(err) = reader.read_exact(&mut payload).await {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(err);
        }
        let checksum = match u32::decode(reader).await {
            Ok(checksum) => checksum,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        };
        if crc32fast::hash(&payload) != checksum {
            return Ok(None);
        }

        // The frame passed its checksum, so decode failures past this point
        // are real corruption, not a torn append.
        let mut payload = payload.as_slice();
        let version = u64::decode(&mut payload).await?;
        let count = u32::decode(&mut payload).await?;
        let mut edits = Vec::with_capacity(count as usize);
        for _ in 0..count {
            edits.push(VersionEdit::decode(&mut payload).await?);
        }
        Ok(Some(LogRecord { version, edits }))
    }

    fn payload_size(&self) -> usize {
        size_of::<u64>()
            + size_of::<u32>()
            + self.edits.iter().map(Encode::size).sum::<usize>()
    }
}
