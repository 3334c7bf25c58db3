use std::{
    fmt::{Display, Formatter},
    io,
};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::serdes::{Decode, Encode};

/// A single partition-column value as recorded in the transaction log.
///
/// The null marker is distinct from the empty string; both are valid
/// partition values and never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionValue {
    /// A concrete (possibly empty) string value.
    Value(String),
    /// The explicit null marker.
    Null,
}

impl PartitionValue {
    /// Whether this is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, PartitionValue::Null)
    }
}

impl From<&str> for PartitionValue {
    fn from(value: &str) -> Self {
        PartitionValue::Value(value.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(value: String) -> Self {
        PartitionValue::Value(value)
    }
}

impl Display for PartitionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionValue::Value(value) => write!(f, "{}", value),
            PartitionValue::Null => write!(f, "NULL"),
        }
    }
}

impl Encode for PartitionValue {
    async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            PartitionValue::Value(value) => {
                0u8.encode(writer).await?;
                value.encode(writer).await
            }
            PartitionValue::Null => 1u8.encode(writer).await,
        }
    }

    fn size(&self) -> usize {
        1 + match self {
            PartitionValue::Value(value) => value.size(),
            PartitionValue::Null => 0,
        }
    }
}

impl Decode for PartitionValue {
    async fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(reader).await? {
            0 => Ok(PartitionValue::Value(String::decode(reader).await?)),
            1 => Ok(PartitionValue::Null),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid partition value tag",
            )),
        }
    }
}

/// Ordered physical-column-name/value pairs identifying one partition.
///
/// Two files belong to the same partition iff their keys are structurally
/// equal: same columns in the same order with exactly equal values. The key
/// for an unpartitioned table is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    columns: Vec<(String, PartitionValue)>,
}

impl PartitionKey {
    /// Build a key from ordered `(physical column name, value)` pairs.
    pub fn new(columns: Vec<(String, PartitionValue)>) -> Self {
        Self { columns }
    }

    /// The value recorded for `physical_name`, if the column is present.
    pub fn column(&self, physical_name: &str) -> Option<&PartitionValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == physical_name)
            .map(|(_, value)| value)
    }

    /// The physical column names, in key order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of partition columns in the key.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True for the unpartitioned key.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, (name, value)) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

impl Encode for PartitionKey {
    async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        (self.columns.len() as u16).encode(writer).await?;
        for (name, value) in &self.columns {
            name.encode(writer).await?;
            value.encode(writer).await?;
        }
        Ok(())
    }

    fn size(&self) -> usize {
        std::mem::size_of::<u16>()
            + self
                .columns
                .iter()
                .map(|(name, value)| name.size() + value.size())
                .sum::<usize>()
    }
}

impl Decode for PartitionKey {
    async fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = u16::decode(reader).await?;
        let mut columns = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let name = String::decode(reader).await?;
            let value = PartitionValue::decode(reader).await?;
            columns.push((name, value));
        }
        Ok(PartitionKey { columns })
    }
}

/// How a table is partitioned.
///
/// Explicitly enumerated: a table is either unpartitioned or partitioned by
/// an ordered list of physical column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PartitionSpec {
    /// The table has no partition columns.
    #[default]
    Unpartitioned,
    /// The table is partitioned by these physical columns, in order.
    PartitionedBy(Vec<String>),
}

impl PartitionSpec {
    /// Build a spec from an ordered list of physical column names.
    pub fn partitioned_by<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PartitionSpec::PartitionedBy(columns.into_iter().map(Into::into).collect())
    }

    /// The physical partition columns, empty for an unpartitioned table.
    pub fn columns(&self) -> &[String] {
        match self {
            PartitionSpec::Unpartitioned => &[],
            PartitionSpec::PartitionedBy(columns) => columns,
        }
    }

    /// Whether `physical_name` is one of the partition columns.
    pub fn is_partition_column(&self, physical_name: &str) -> bool {
        self.columns().iter().any(|name| name == physical_name)
    }
}

/// Logical-to-physical column name table.
///
/// Owned by the external schema collaborator; predicates are written against
/// logical names and resolved through this mapping before evaluation. Names
/// without an entry map to themselves.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    /// The identity mapping.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Add a `logical -> physical` entry.
    pub fn with(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.entries.push((logical.into(), physical.into()));
        self
    }

    /// Resolve a logical name to its physical name.
    pub fn physical<'a>(&'a self, logical: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(l, _)| l == logical)
            .map(|(_, p)| p.as_str())
            .unwrap_or(logical)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, SeekFrom};

    use tokio::io::AsyncSeekExt;

    use super::*;
    use crate::serdes::{Decode, Encode};

    #[test]
    fn null_is_not_the_empty_string() {
        let null = PartitionValue::Null;
        let empty = PartitionValue::Value(String::new());
        assert_ne!(null, empty);
        assert!(null.is_null());
        assert!(!empty.is_null());
    }

    #[test]
    fn key_equality_is_structural() {
        let a = PartitionKey::new(vec![("id".into(), "0".into())]);
        let b = PartitionKey::new(vec![("id".into(), "0".into())]);
        let c = PartitionKey::new(vec![("id".into(), PartitionValue::Null)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, PartitionKey::default());
    }

    #[test]
    fn mapping_falls_back_to_identity() {
        let mapping = ColumnMapping::identity().with("region", "col-7f3a");
        assert_eq!(mapping.physical("region"), "col-7f3a");
        assert_eq!(mapping.physical("id"), "id");
    }

    #[tokio::test]
    async fn key_encode_decode() {
        let keys = vec![
            PartitionKey::default(),
            PartitionKey::new(vec![
                ("id".into(), "0".into()),
                ("region".into(), PartitionValue::Null),
                ("label".into(), "".into()),
            ]),
        ];

        let mut bytes = Vec::new();
        let mut cursor = Cursor::new(&mut bytes);
        for key in &keys {
            key.encode(&mut cursor).await.unwrap();
        }

        cursor.seek(SeekFrom::Start(0)).await.unwrap();
        for key in &keys {
            assert_eq!(&PartitionKey::decode(&mut cursor).await.unwrap(), key);
        }
    }
}
