use crate::{
    aggregate::AggregateRow,
    error::StoreError,
    store::{RawTable, RowStore, ensure_parent},
};
use rusqlite::{Connection, OpenFlags, params, types::ValueRef};
use std::path::{Path, PathBuf};
use tracing::debug;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS p2p_data (
        datetime_utc  TEXT NOT NULL,
        asset         TEXT,
        fiat          TEXT,
        buy_count     INTEGER,
        buy_median    REAL,
        buy_avg       REAL,
        buy_min       REAL,
        buy_max       REAL,
        sell_count    INTEGER,
        sell_median   REAL,
        sell_avg      REAL,
        sell_min      REAL,
        sell_max      REAL,
        market_median REAL
    );
    CREATE INDEX IF NOT EXISTS idx_p2p_data_datetime_utc ON p2p_data (datetime_utc);
";

const INSERT_ROW: &str = "
    INSERT INTO p2p_data (
        datetime_utc, asset, fiat,
        buy_count, buy_median, buy_avg, buy_min, buy_max,
        sell_count, sell_median, sell_avg, sell_min, sell_max,
        market_median
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
";

/// SQLite database with a `p2p_data` table.
///
/// Timestamps are ISO-8601 text so they sort lexically. No uniqueness
/// constraint is enforced on `datetime_utc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open for writing, creating the database and table if absent.
    pub fn open(&self) -> Result<Connection, StoreError> {
        ensure_parent(&self.path)?;
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(conn)
    }

    /// Open an existing database without creating anything.
    pub fn open_read_only(&self) -> Result<Connection, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(&self.path, flags)?)
    }
}

impl RowStore for SqliteStore {
    fn append(&self, row: &AggregateRow) -> Result<usize, StoreError> {
        let conn = self.open()?;
        let record = row.to_record();

        conn.execute(
            INSERT_ROW,
            params![
                record.datetime_utc,
                record.asset,
                record.fiat,
                record.buy_count,
                record.buy_median,
                record.buy_avg,
                record.buy_min,
                record.buy_max,
                record.sell_count,
                record.sell_median,
                record.sell_avg,
                record.sell_min,
                record.sell_max,
                record.market_median,
            ],
        )?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM p2p_data", [], |row| row.get(0))?;
        debug!(path = %self.path.display(), total, "inserted row into SQLite store");
        Ok(total as usize)
    }

    fn load_table(&self) -> Result<RawTable, StoreError> {
        let conn = self.open_read_only()?;
        load_table(&conn)
    }
}

/// Read the whole `p2p_data` table, oldest first, as untyped cells.
pub fn load_table(conn: &Connection) -> Result<RawTable, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM p2p_data ORDER BY datetime_utc, rowid")?;
    let headers = stmt.column_names().into_iter().map(str::to_string).collect::<Vec<_>>();
    let width = headers.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|index| row.get_ref(index).map(cell_text))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawTable::new(headers, rows))
}

fn cell_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => String::new(),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Text(value) => String::from_utf8_lossy(value).into_owned(),
    }
}
