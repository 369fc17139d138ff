//! Durable, append-only storage of [`AggregateRow`]s.

use crate::{aggregate::AggregateRow, error::StoreError};
use std::path::PathBuf;

/// Comma-separated flat file store.
pub mod flat_file;

/// SQLite `p2p_data` table store.
pub mod sqlite;

pub use flat_file::CsvStore;
pub use sqlite::SqliteStore;

/// Append-only store of poll cycle rows.
pub trait RowStore: Send + Sync {
    /// Append `row`, creating the store on first use.
    ///
    /// Returns the number of stored rows after the append.
    fn append(&self, row: &AggregateRow) -> Result<usize, StoreError>;

    /// Read every stored row back as untyped cells.
    fn load_table(&self) -> Result<RawTable, StoreError>;
}

/// Untyped tabular data: a header row plus string cells.
///
/// Absent values are empty strings. Rows may be shorter than the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Kind of [`RowStore`] the fetcher appends to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Csv(PathBuf),
    Sqlite(PathBuf),
}

impl StoreKind {
    pub fn open(&self) -> Box<dyn RowStore> {
        match self {
            StoreKind::Csv(path) => Box::new(CsvStore::new(path)),
            StoreKind::Sqlite(path) => Box::new(SqliteStore::new(path)),
        }
    }
}

/// Create the parent directory of `path` if it has one.
fn ensure_parent(path: &std::path::Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}
