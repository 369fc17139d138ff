//! Loading the accumulated rows back as a display-ready time series.
//!
//! Every [`DataSource`] is read into a [`RawTable`] first, so CSV files, CSV
//! over HTTP and SQLite databases share one normalisation path.

use crate::{
    error::LoadError,
    store::{CsvStore, RawTable, RowStore, SqliteStore, flat_file},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use derive_more::Display;
use serde::Serialize;
use std::{path::PathBuf, str::FromStr, time::Duration};
use tracing::debug;

/// Upper bound on fetching a remote CSV, connect and body included.
pub const CSV_URL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timezone used for every derived date/time display field.
pub const DISPLAY_TIMEZONE: Tz = chrono_tz::America::Caracas;

/// Candidate timestamp column names, highest priority first.
pub const TIMESTAMP_COLUMNS: [&str; 5] = ["datetime_utc", "timestamp", "datetime", "date", "time"];

/// Columns coerced to numbers, absent when missing or non-numeric.
pub const NUMERIC_COLUMNS: [&str; 9] = [
    "buy_min",
    "buy_max",
    "buy_median",
    "buy_avg",
    "sell_min",
    "sell_max",
    "sell_median",
    "sell_avg",
    "market_median",
];

/// Location of the accumulated rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum DataSource {
    #[display("{}", _0.display())]
    CsvFile(PathBuf),
    #[display("{_0}")]
    CsvUrl(String),
    #[display("sqlite:{}", _0.display())]
    Sqlite(PathBuf),
}

impl FromStr for DataSource {
    type Err = LoadError;

    /// `sqlite:<path>`, `http(s)://<url>` or a CSV file path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LoadError::Source("empty data source".to_string()));
        }

        if let Some(path) = s.strip_prefix("sqlite:") {
            Ok(DataSource::Sqlite(PathBuf::from(path)))
        } else if s.starts_with("http://") || s.starts_with("https://") {
            Ok(DataSource::CsvUrl(s.to_string()))
        } else {
            Ok(DataSource::CsvFile(PathBuf::from(s)))
        }
    }
}

impl DataSource {
    /// Read the raw rows from the source.
    pub async fn read_table(&self) -> Result<RawTable, LoadError> {
        match self {
            DataSource::CsvFile(path) => {
                let store = CsvStore::new(path);
                blocking(move || store.load_table()).await
            }
            DataSource::Sqlite(path) => {
                let store = SqliteStore::new(path);
                blocking(move || store.load_table()).await
            }
            DataSource::CsvUrl(url) => fetch_csv(url, CSV_URL_TIMEOUT).await,
        }
    }

    /// Read and normalise the source into a [`Series`].
    pub async fn load(&self, timezone: Tz) -> Result<Series, LoadError> {
        let table = self.read_table().await?;
        debug!(source = %self, rows = table.len(), "read raw table");
        normalise(table, timezone)
    }
}

async fn fetch_csv(url: &str, timeout: Duration) -> Result<RawTable, LoadError> {
    let source = |error: reqwest::Error| LoadError::Source(error.to_string());

    let client = reqwest::Client::builder().timeout(timeout).build().map_err(source)?;
    let body = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(source)?
        .bytes()
        .await
        .map_err(source)?;

    Ok(flat_file::read_table(body.as_ref())?)
}

async fn blocking<F>(read: F) -> Result<RawTable, LoadError>
where
    F: FnOnce() -> Result<RawTable, crate::error::StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(read)
        .await
        .map_err(|error| LoadError::Source(error.to_string()))?
        .map_err(LoadError::from)
}

/// One stored row, normalised for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub datetime_utc: DateTime<Utc>,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub datetime_local: DateTime<Tz>,
    pub asset: Option<String>,
    pub fiat: Option<String>,
    pub buy_count: Option<u32>,
    pub sell_count: Option<u32>,
    pub buy_min: Option<f64>,
    pub buy_max: Option<f64>,
    pub buy_median: Option<f64>,
    pub buy_avg: Option<f64>,
    pub sell_min: Option<f64>,
    pub sell_max: Option<f64>,
    pub sell_median: Option<f64>,
    pub sell_avg: Option<f64>,
    pub market_median: Option<f64>,
}

impl Observation {
    /// Display date ("Fecha").
    pub fn date(&self) -> NaiveDate {
        self.datetime_local.date_naive()
    }

    /// Display time of day ("Hora"), `HH:MM:SS`.
    pub fn time_of_day(&self) -> String {
        self.datetime_local.format("%H:%M:%S").to_string()
    }
}

fn serialize_rfc3339<S>(time: &DateTime<Tz>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&time.to_rfc3339())
}

/// Rows ordered by timestamp, oldest first, with their display timezone.
///
/// Duplicate and out-of-order timestamps are tolerated; ordering is stable so
/// duplicates keep their stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    timezone: Tz,
    observations: Vec<Observation>,
}

impl Series {
    pub fn new(timezone: Tz, mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|observation| observation.datetime_utc);
        Self {
            timezone,
            observations,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// `(timestamp, market median)` pairs, skipping absent medians.
    pub fn market_medians(&self) -> impl DoubleEndedIterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.observations
            .iter()
            .filter_map(|observation| observation.market_median.map(|value| (observation.datetime_utc, value)))
    }

    /// Rows at or after `cutoff`.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Self {
        self.filtered(|observation| observation.datetime_utc >= cutoff)
    }

    /// Rows within `window` of the latest row, not of wall-clock time, so a
    /// stale store still yields a populated window.
    ///
    /// A window reaching before the earliest representable time keeps every row.
    pub fn trailing(&self, window: TimeDelta) -> Self {
        match self
            .latest()
            .and_then(|latest| latest.datetime_utc.checked_sub_signed(window))
        {
            Some(cutoff) => self.since(cutoff),
            None => self.clone(),
        }
    }

    /// Rows whose display date lies in `[from, to]`.
    pub fn between_dates(&self, from: NaiveDate, to: NaiveDate) -> Self {
        self.filtered(|observation| {
            let date = observation.date();
            date >= from && date <= to
        })
    }

    fn filtered<F>(&self, keep: F) -> Self
    where
        F: Fn(&Observation) -> bool,
    {
        Self {
            timezone: self.timezone,
            observations: self.observations.iter().filter(|o| keep(o)).cloned().collect(),
        }
    }
}

/// Normalise raw rows into a [`Series`] in `timezone`.
///
/// Fails with [`LoadError::MissingColumn`] when no timestamp column exists and
/// with [`LoadError::EmptyData`] when no row has a parseable timestamp.
pub fn normalise(table: RawTable, timezone: Tz) -> Result<Series, LoadError> {
    let time_index = TIMESTAMP_COLUMNS
        .iter()
        .find_map(|column| table.column_index(column))
        .ok_or_else(|| LoadError::MissingColumn {
            available: table.headers.clone(),
        })?;

    let column = |name: &str| table.column_index(name);
    let numeric_indices = NUMERIC_COLUMNS.map(column);
    let asset_index = column("asset");
    let fiat_index = column("fiat");
    let buy_count_index = column("buy_count");
    let sell_count_index = column("sell_count");

    let total = table.rows.len();
    let observations = table
        .rows
        .iter()
        .filter_map(|cells| {
            let cell = |index: Option<usize>| index.and_then(|index| cells.get(index)).map(String::as_str);
            let number = |index: Option<usize>| cell(index).and_then(parse_number);
            let text = |index: Option<usize>| cell(index).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

            let datetime_utc = cell(Some(time_index)).and_then(parse_timestamp)?;
            let [buy_min, buy_max, buy_median, buy_avg, sell_min, sell_max, sell_median, sell_avg, market_median] =
                numeric_indices.map(number);

            Some(Observation {
                datetime_utc,
                datetime_local: datetime_utc.with_timezone(&timezone),
                asset: text(asset_index),
                fiat: text(fiat_index),
                buy_count: cell(buy_count_index).and_then(parse_count),
                sell_count: cell(sell_count_index).and_then(parse_count),
                buy_min,
                buy_max,
                buy_median,
                buy_avg,
                sell_min,
                sell_max,
                sell_median,
                sell_avg,
                market_median,
            })
        })
        .collect::<Vec<_>>();

    if observations.is_empty() {
        return Err(LoadError::EmptyData);
    }

    if observations.len() < total {
        debug!(dropped = total - observations.len(), "dropped rows without a valid timestamp");
    }

    Ok(Series::new(timezone, observations))
}

/// Parse a stored timestamp, assuming UTC when no offset is present.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(time.with_timezone(&Utc));
    }

    if let Ok(time) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(time.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(time.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_count(raw: &str) -> Option<u32> {
    parse_number(raw)
        .filter(|value| *value >= 0.0 && value.fract() == 0.0 && *value <= u32::MAX as f64)
        .map(|value| value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter().map(|row| row.iter().map(|c| c.to_string()).collect()).collect(),
        )
    }

    #[test]
    fn test_parse_timestamp() {
        struct TestCase {
            input: &'static str,
            expected: Option<DateTime<Utc>>,
        }

        let noon = Utc.with_ymd_and_hms(2025, 10, 17, 12, 0, 0).unwrap();

        let tests = vec![
            TestCase {
                // TC0: ISO-8601 with offset and microseconds
                input: "2025-10-17T12:00:00.000000+00:00",
                expected: Some(noon),
            },
            TestCase {
                // TC1: non-UTC offset converted to UTC
                input: "2025-10-17T08:00:00-04:00",
                expected: Some(noon),
            },
            TestCase {
                // TC2: space separated with offset
                input: "2025-10-17 12:00:00+00:00",
                expected: Some(noon),
            },
            TestCase {
                // TC3: naive assumed UTC
                input: "2025-10-17 12:00:00",
                expected: Some(noon),
            },
            TestCase {
                // TC4: bare date is midnight UTC
                input: "2025-10-17",
                expected: Some(Utc.with_ymd_and_hms(2025, 10, 17, 0, 0, 0).unwrap()),
            },
            TestCase {
                // TC5: garbage
                input: "yesterday",
                expected: None,
            },
            TestCase {
                // TC6: empty
                input: "",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = parse_timestamp(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_normalise_missing_timestamp_column() {
        let input = table(&["asset", "market_median"], &[&["USDT", "36.0"]]);

        let actual = normalise(input, DISPLAY_TIMEZONE);

        assert_eq!(
            actual,
            Err(LoadError::MissingColumn {
                available: vec!["asset".to_string(), "market_median".to_string()]
            })
        );
    }

    #[test]
    fn test_normalise_empty_series() {
        let input = table(&["datetime_utc", "market_median"], &[]);

        assert_eq!(normalise(input, DISPLAY_TIMEZONE), Err(LoadError::EmptyData));
    }

    #[test]
    fn test_normalise_all_timestamps_invalid() {
        let input = table(&["timestamp", "market_median"], &[&["never", "36.0"], &["", "37.0"]]);

        assert_eq!(normalise(input, DISPLAY_TIMEZONE), Err(LoadError::EmptyData));
    }

    #[test]
    fn test_normalise_uses_column_priority_and_display_timezone() {
        let input = table(
            &["time", "datetime_utc", "market_median", "buy_count"],
            &[
                &["ignored", "2025-10-17T02:30:00+00:00", "36.5", "20"],
                &["ignored", "broken", "37.0", "20"],
                &["ignored", "2025-10-17T01:00:00+00:00", "n/a", "x"],
            ],
        );

        let series = normalise(input, DISPLAY_TIMEZONE).unwrap();

        assert_eq!(series.len(), 2);
        let first = series.first().unwrap();
        assert_eq!(first.market_median, None);
        assert_eq!(first.buy_count, None);
        assert_eq!(first.sell_median, None);
        // Caracas is UTC-4: 01:00 UTC is 21:00 the previous day
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(2025, 10, 16).unwrap());
        assert_eq!(first.time_of_day(), "21:00:00");
        assert_eq!(first.datetime_local.hour(), 21);

        let latest = series.latest().unwrap();
        assert_eq!(latest.market_median, Some(36.5));
        assert_eq!(latest.buy_count, Some(20));
        assert_eq!(latest.time_of_day(), "22:30:00");
    }

    #[test]
    fn test_trailing_window_relative_to_latest_row() {
        let day = |d: f64| DateTime::from_timestamp((d * 86_400.0) as i64, 0).unwrap().to_rfc3339();
        let rows = [10.0, 69.0, 69.9, 70.0, 85.0, 100.0].map(|d| vec![day(d), d.to_string()]);
        let input = RawTable::new(
            vec!["datetime_utc".to_string(), "market_median".to_string()],
            rows.to_vec(),
        );
        let series = normalise(input, DISPLAY_TIMEZONE).unwrap();

        let window = series.trailing(TimeDelta::days(30));

        let kept = window
            .observations()
            .iter()
            .filter_map(|observation| observation.market_median)
            .collect::<Vec<_>>();
        assert_eq!(kept, vec![70.0, 85.0, 100.0]);
    }

    #[test]
    fn test_trailing_window_beyond_time_range_keeps_everything() {
        let input = table(
            &["datetime_utc", "market_median"],
            &[&["2025-10-16T00:00:00+00:00", "36"], &["2025-10-17T00:00:00+00:00", "37"]],
        );
        let series = normalise(input, DISPLAY_TIMEZONE).unwrap();

        let window = series.trailing(TimeDelta::days(i64::from(u32::MAX)));

        assert_eq!(window, series);
    }

    #[test]
    fn test_between_dates_uses_display_dates() {
        let input = table(
            &["datetime_utc", "market_median"],
            &[
                &["2025-10-17T03:00:00+00:00", "1"],
                &["2025-10-17T05:00:00+00:00", "2"],
                &["2025-10-18T05:00:00+00:00", "3"],
            ],
        );
        let series = normalise(input, DISPLAY_TIMEZONE).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 10, 17).unwrap();

        let filtered = series.between_dates(day, day);

        let values = filtered.market_medians().map(|(_, value)| value).collect::<Vec<_>>();
        assert_eq!(values, vec![2.0]);
    }

    #[test]
    fn test_data_source_from_str() {
        struct TestCase {
            input: &'static str,
            expected: DataSource,
        }

        let tests = vec![
            TestCase {
                // TC0: CSV file path
                input: "data/p2p_ves_usdt.csv",
                expected: DataSource::CsvFile(PathBuf::from("data/p2p_ves_usdt.csv")),
            },
            TestCase {
                // TC1: CSV over HTTPS
                input: "https://example.com/p2p.csv",
                expected: DataSource::CsvUrl("https://example.com/p2p.csv".to_string()),
            },
            TestCase {
                // TC2: SQLite database
                input: "sqlite:data/p2p.db",
                expected: DataSource::Sqlite(PathBuf::from("data/p2p.db")),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.parse::<DataSource>().unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
            assert_eq!(actual.to_string(), test.input, "TC{} display failed", index);
        }
    }

    #[tokio::test]
    async fn test_load_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p2p.csv");
        std::fs::write(
            &path,
            "datetime_utc,asset,fiat,market_median\n2025-10-17T12:00:00+00:00,USDT,VES,36.4\n",
        )
        .unwrap();

        let series = DataSource::CsvFile(path).load(DISPLAY_TIMEZONE).await.unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series.latest().unwrap().asset.as_deref(), Some("USDT"));
    }

    #[tokio::test]
    async fn test_csv_url_gives_up_after_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/p2p.csv", listener.local_addr().unwrap());

        // Accept and never answer.
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let started = std::time::Instant::now();
        let result = fetch_csv(&url, Duration::from_millis(200)).await;

        assert!(matches!(result, Err(LoadError::Source(_))), "got {result:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }
}
