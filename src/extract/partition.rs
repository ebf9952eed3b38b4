use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::tables::{RegisteredTable, StagingTable};

/// Where published partitions come from. One partition holds one table's
/// rows for one reporting year.
pub trait PartitionSource {
    fn read(&self, table: StagingTable, year: u16) -> Result<Vec<u8>>;

    /// Human-readable location, for failure reports.
    fn describe(&self, table: StagingTable, year: u16) -> String;
}

/// Partitions laid out as `<root>/<source>/<year>/<table>.csv`.
#[derive(Debug, Clone)]
pub struct FsPartitionSource {
    root: PathBuf,
}

impl FsPartitionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, table: StagingTable, year: u16) -> PathBuf {
        self.root
            .join(table.dataset().slug())
            .join(year.to_string())
            .join(format!("{}.csv", table.name()))
    }
}

impl PartitionSource for FsPartitionSource {
    fn read(&self, table: StagingTable, year: u16) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_for(table, year))?)
    }

    fn describe(&self, table: StagingTable, year: u16) -> String {
        self.path_for(table, year).display().to_string()
    }
}

/// Decode partition bytes: UTF-8 when valid, otherwise Windows-1252, which
/// older filings are published in. A leading BOM is dropped. The flag is
/// true when the fallback was used.
pub fn decode(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), false),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            (text, true)
        }
    }
}

/// Hex SHA-256 of the raw partition bytes.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_1252_is_the_fallback() {
        let (text, fallback) = decode(b"plant_name\nCaf\xe9 Station\n");
        assert!(fallback);
        assert!(text.contains("Café Station"));

        let (text, fallback) = decode("plant_name\nCafé Station\n".as_bytes());
        assert!(!fallback);
        assert!(text.contains("Café Station"));
    }

    #[test]
    fn bom_is_stripped() {
        let (text, _) = decode(b"\xEF\xBB\xBFrespondent_id\n1\n");
        assert!(text.starts_with("respondent_id"));
    }

    #[test]
    fn partition_paths_follow_source_and_year() {
        let source = FsPartitionSource::new("/data");
        assert_eq!(
            source.path_for(StagingTable::Eia923GenerationFuel, 2012),
            PathBuf::from("/data/eia923/2012/generation_fuel.csv")
        );
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
