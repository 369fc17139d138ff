use crate::{
    aggregate::{AggregateRow, COLUMNS},
    error::StoreError,
    store::{RawTable, RowStore, ensure_parent},
};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use tracing::debug;

/// CSV file holding one row per poll cycle.
///
/// Every append reads the whole file and rewrites it with the new row last.
/// There is no locking: overlapping appends may lose rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowStore for CsvStore {
    fn append(&self, row: &AggregateRow) -> Result<usize, StoreError> {
        ensure_parent(&self.path)?;

        let existing = if self.path.exists() {
            read_table(File::open(&self.path)?)?
        } else {
            RawTable::default()
        };

        // Keep existing columns in place, add any canonical column they lack
        let mut headers = existing.headers.clone();
        for column in COLUMNS {
            if !headers.iter().any(|header| header == column) {
                headers.push(column.to_string());
            }
        }

        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(&headers)?;

        for cells in &existing.rows {
            let padded = (0..headers.len()).map(|index| cells.get(index).map(String::as_str).unwrap_or(""));
            writer.write_record(padded)?;
        }

        let record = row.to_record();
        writer.write_record(headers.iter().map(|header| record.cell(header)))?;
        writer.flush()?;

        let total = existing.rows.len() + 1;
        debug!(path = %self.path.display(), total, "appended row to CSV store");
        Ok(total)
    }

    fn load_table(&self) -> Result<RawTable, StoreError> {
        read_table(File::open(&self.path)?)
    }
}

/// Read CSV text with a header row into a [`RawTable`].
pub fn read_table<R: Read>(reader: R) -> Result<RawTable, StoreError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader.headers()?.iter().map(str::to_string).collect::<Vec<_>>();

    let rows = reader
        .records()
        .map(|record| record.map(|record| record.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawTable::new(headers, rows))
}
