use std::{
    fmt::{Display, Formatter},
    time::{SystemTime, UNIX_EPOCH},
};

use ulid::Ulid;

pub(crate) type FileId = Ulid;

pub(crate) fn generate_file_id() -> FileId {
    Ulid::new()
}

/// Unix-epoch milliseconds, used as the opaque modification tag on data files.
pub(crate) fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

pub(crate) enum FileType {
    Parquet,
    Log,
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Parquet => write!(f, "parquet"),
            FileType::Log => write!(f, "log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_are_unique() {
        let a = generate_file_id();
        let b = generate_file_id();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 26);
    }

    #[test]
    fn file_type_suffixes() {
        assert_eq!(FileType::Parquet.to_string(), "parquet");
        assert_eq!(FileType::Log.to_string(), "log");
    }
}
