//! OHLC resampling of the market-median series.
//!
//! Bucket boundaries are aligned in the display timezone:
//! `start = floor((t + offset - origin) / width) * width + origin - offset`,
//! so daily buckets open at local midnight and weekly buckets on local Monday.
//! High and low are taken from the market median itself in both the in-memory
//! and the SQL realisation.

use crate::{
    error::LoadError,
    load::{DataSource, Series},
    store::SqliteStore,
};
use chrono::{DateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use derive_more::{Constructor, Display};
use itertools::Itertools;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

/// Windowed SQLite realisation of the resampler.
pub mod sql;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// 1970-01-05, the first Monday after the epoch.
const MONDAY_ORIGIN: i64 = 4 * DAY;

/// Candle width selectable on the dashboard.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Display, Serialize)]
pub enum Interval {
    #[display("5min")]
    FiveMinutes,
    #[display("15min")]
    FifteenMinutes,
    #[display("30min")]
    ThirtyMinutes,
    #[default]
    #[display("1h")]
    OneHour,
    #[display("2h")]
    TwoHours,
    #[display("4h")]
    FourHours,
    #[display("1d")]
    Daily,
    #[display("1w")]
    Weekly,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::Daily,
        Interval::Weekly,
    ];

    pub fn width_secs(&self) -> i64 {
        match self {
            Interval::FiveMinutes => 5 * MINUTE,
            Interval::FifteenMinutes => 15 * MINUTE,
            Interval::ThirtyMinutes => 30 * MINUTE,
            Interval::OneHour => HOUR,
            Interval::TwoHours => 2 * HOUR,
            Interval::FourHours => 4 * HOUR,
            Interval::Daily => DAY,
            Interval::Weekly => 7 * DAY,
        }
    }

    pub fn width(&self) -> TimeDelta {
        TimeDelta::seconds(self.width_secs())
    }

    /// Epoch offset buckets are counted from.
    pub fn origin_secs(&self) -> i64 {
        match self {
            Interval::Weekly => MONDAY_ORIGIN,
            _ => 0,
        }
    }

    /// Human readable selector label.
    pub fn label(&self) -> &'static str {
        match self {
            Interval::FiveMinutes => "5 min",
            Interval::FifteenMinutes => "15 min",
            Interval::ThirtyMinutes => "30 min",
            Interval::OneHour => "1 hour",
            Interval::TwoHours => "2 hours",
            Interval::FourHours => "4 hours",
            Interval::Daily => "Daily",
            Interval::Weekly => "Weekly",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "5min" | "5m" | "5t" => Ok(Interval::FiveMinutes),
            "15min" | "15m" | "15t" => Ok(Interval::FifteenMinutes),
            "30min" | "30m" | "30t" => Ok(Interval::ThirtyMinutes),
            "1h" | "h" | "60min" => Ok(Interval::OneHour),
            "2h" => Ok(Interval::TwoHours),
            "4h" => Ok(Interval::FourHours),
            "1d" | "d" | "daily" => Ok(Interval::Daily),
            "1w" | "w" | "weekly" => Ok(Interval::Weekly),
            other => Err(format!("unsupported interval: {other}")),
        }
    }
}

/// Whether a candle opens at its first observation or at the previous close.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Display, Serialize)]
pub enum Continuity {
    /// Open is the first observed value in the bucket.
    #[default]
    #[display("observed")]
    Observed,
    /// Open is the previous bucket's close, hiding gaps between buckets.
    #[display("forced")]
    Forced,
}

impl FromStr for Continuity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observed" | "false" | "0" | "" => Ok(Continuity::Observed),
            "forced" | "true" | "1" => Ok(Continuity::Forced),
            other => Err(format!("unsupported continuity mode: {other}")),
        }
    }
}

/// Open/high/low/close of the market median over one interval.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Constructor)]
pub struct Candle {
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub samples: usize,
}

/// UTC offset of `timezone` at `time`, in seconds.
pub fn utc_offset_secs(timezone: Tz, time: DateTime<Utc>) -> i64 {
    i64::from(timezone.offset_from_utc_datetime(&time.naive_utc()).fix().local_minus_utc())
}

/// Bucket start containing `time`.
pub fn bucket_start(time: DateTime<Utc>, interval: Interval, timezone: Tz) -> DateTime<Utc> {
    let offset = utc_offset_secs(timezone, time);
    let width = interval.width_secs();
    let origin = interval.origin_secs();

    let start = (time.timestamp() + offset - origin).div_euclid(width) * width + origin - offset;
    DateTime::from_timestamp(start, 0).unwrap_or(time)
}

/// Resample `(time, value)` points, already in time order, into candles.
///
/// Buckets without points are omitted.
pub fn resample_points<I>(points: I, interval: Interval, timezone: Tz) -> Vec<Candle>
where
    I: IntoIterator<Item = (DateTime<Utc>, f64)>,
{
    let chunks = points
        .into_iter()
        .chunk_by(|(time, _)| bucket_start(*time, interval, timezone));

    chunks
        .into_iter()
        .filter_map(|(start, mut bucket)| {
            let (_, first) = bucket.next()?;
            let mut candle = Candle::new(start, first, first, first, first, 1);
            for (_, value) in bucket {
                candle.high = candle.high.max(value);
                candle.low = candle.low.min(value);
                candle.close = value;
                candle.samples += 1;
            }
            Some(candle)
        })
        .collect()
}

/// Resample the market median of `series`.
pub fn resample(series: &Series, interval: Interval, continuity: Continuity) -> Vec<Candle> {
    let mut candles = resample_points(series.market_medians(), interval, series.timezone());
    apply_continuity(&mut candles, continuity);
    candles
}

/// Replace each open with the previous close when `continuity` is forced.
pub fn apply_continuity(candles: &mut [Candle], continuity: Continuity) {
    if continuity == Continuity::Observed {
        return;
    }

    for index in 1..candles.len() {
        candles[index].open = candles[index - 1].close;
    }
}

/// Candles for `series`, loaded from `source`.
///
/// SQLite sources aggregate with the windowed query over the time span of
/// `series`; every other source resamples in memory.
pub async fn candles_for(
    source: &DataSource,
    series: &Series,
    interval: Interval,
    continuity: Continuity,
) -> Result<Vec<Candle>, LoadError> {
    let (Some(first), Some(last)) = (series.first(), series.latest()) else {
        return Ok(Vec::new());
    };

    match source {
        DataSource::Sqlite(path) => {
            let store = SqliteStore::new(path);
            let range = (first.datetime_utc, last.datetime_utc);
            let timezone = series.timezone();

            let mut candles = tokio::task::spawn_blocking(move || {
                let conn = store.open_read_only()?;
                sql::query_candles(&conn, interval, timezone, Some(range))
            })
            .await
            .map_err(|error| LoadError::Source(error.to_string()))??;

            debug!(%interval, candles = candles.len(), "aggregated candles in SQLite");
            apply_continuity(&mut candles, continuity);
            Ok(candles)
        }
        DataSource::CsvFile(_) | DataSource::CsvUrl(_) => Ok(resample(series, interval, continuity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{DISPLAY_TIMEZONE, normalise};
    use crate::store::RawTable;
    use chrono::{Datelike, NaiveDate, Timelike, Weekday};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 17, hour, minute, 0).unwrap()
    }

    fn series(points: &[(DateTime<Utc>, &str)]) -> Series {
        let table = RawTable::new(
            vec!["datetime_utc".to_string(), "market_median".to_string()],
            points
                .iter()
                .map(|(time, value)| vec![time.to_rfc3339(), value.to_string()])
                .collect(),
        );
        normalise(table, DISPLAY_TIMEZONE).unwrap()
    }

    #[test]
    fn test_interval_from_str() {
        struct TestCase {
            input: &'static str,
            expected: Result<Interval, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: minutes
                input: "5min",
                expected: Ok(Interval::FiveMinutes),
            },
            TestCase {
                // TC1: short minutes, mixed case
                input: "15M",
                expected: Ok(Interval::FifteenMinutes),
            },
            TestCase {
                // TC2: hours
                input: "4h",
                expected: Ok(Interval::FourHours),
            },
            TestCase {
                // TC3: daily alias
                input: "D",
                expected: Ok(Interval::Daily),
            },
            TestCase {
                // TC4: weekly alias
                input: "weekly",
                expected: Ok(Interval::Weekly),
            },
            TestCase {
                // TC5: unsupported width
                input: "3h",
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.parse::<Interval>().map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_interval_display_round_trips_for_selector() {
        for interval in Interval::ALL {
            assert_eq!(interval.to_string().parse::<Interval>(), Ok(interval));
        }
    }

    #[test]
    fn test_default_interval_is_one_hour() {
        assert_eq!(Interval::default(), Interval::OneHour);
        assert_eq!(Interval::default().to_string(), "1h");
    }

    #[test]
    fn test_bucket_start_alignment() {
        struct TestCase {
            time: DateTime<Utc>,
            interval: Interval,
            timezone: Tz,
            expected: DateTime<Utc>,
        }

        let tests = vec![
            TestCase {
                // TC0: 15 minute bucket
                time: at(12, 44),
                interval: Interval::FifteenMinutes,
                timezone: DISPLAY_TIMEZONE,
                expected: at(12, 30),
            },
            TestCase {
                // TC1: 4 hour bucket in UTC
                time: at(13, 10),
                interval: Interval::FourHours,
                timezone: Tz::UTC,
                expected: at(12, 0),
            },
            TestCase {
                // TC2: daily bucket opens at Caracas midnight (04:00 UTC)
                time: at(2, 0),
                interval: Interval::Daily,
                timezone: DISPLAY_TIMEZONE,
                expected: Utc.with_ymd_and_hms(2025, 10, 16, 4, 0, 0).unwrap(),
            },
            TestCase {
                // TC3: daily bucket in UTC
                time: at(2, 0),
                interval: Interval::Daily,
                timezone: Tz::UTC,
                expected: at(0, 0),
            },
            TestCase {
                // TC4: weekly bucket opens on Monday
                time: at(12, 0),
                interval: Interval::Weekly,
                timezone: Tz::UTC,
                expected: Utc.with_ymd_and_hms(2025, 10, 13, 0, 0, 0).unwrap(),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = bucket_start(test.time, test.interval, test.timezone);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_weekly_bucket_is_local_monday_midnight() {
        let start = bucket_start(at(12, 0), Interval::Weekly, DISPLAY_TIMEZONE);

        let local = start.with_timezone(&DISPLAY_TIMEZONE);
        assert_eq!(local.weekday(), Weekday::Mon);
        assert_eq!(local.hour(), 0);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 10, 13).unwrap());
    }

    #[test]
    fn test_one_hour_bucket_ohlc() {
        let input = series(&[(at(0, 0), "10"), (at(0, 10), "12"), (at(0, 50), "9")]);

        let candles = resample(&input, Interval::OneHour, Continuity::Observed);

        assert_eq!(candles, vec![Candle::new(at(0, 0), 10.0, 12.0, 9.0, 9.0, 3)]);
    }

    #[test]
    fn test_empty_buckets_are_omitted_and_absent_values_skipped() {
        let input = series(&[
            (at(0, 5), "10"),
            (at(0, 20), ""),
            (at(3, 15), "11"),
            (at(3, 45), "13"),
        ]);

        let candles = resample(&input, Interval::OneHour, Continuity::Observed);

        assert_eq!(
            candles,
            vec![
                Candle::new(at(0, 0), 10.0, 10.0, 10.0, 10.0, 1),
                Candle::new(at(3, 0), 11.0, 13.0, 11.0, 13.0, 2),
            ]
        );
    }

    #[test]
    fn test_forced_continuity_opens_at_previous_close() {
        let input = series(&[(at(0, 5), "10"), (at(0, 35), "10.5"), (at(3, 15), "11"), (at(3, 45), "13")]);

        let candles = resample(&input, Interval::OneHour, Continuity::Forced);

        assert_eq!(candles[0].open, 10.0);
        assert_eq!(candles[1].open, 10.5);
        assert_eq!(candles[1].close, 13.0);
    }

    #[test]
    fn test_resample_is_idempotent() {
        let input = series(&[
            (at(0, 5), "10"),
            (at(0, 35), "10.5"),
            (at(1, 15), "11"),
            (at(7, 45), "13"),
            (at(7, 50), "12"),
        ]);

        for interval in Interval::ALL {
            let first = resample(&input, interval, Continuity::Observed);
            let second = resample(&input, interval, Continuity::Observed);
            assert_eq!(first, second, "{interval} not idempotent");
        }
    }

    #[test]
    fn test_unsorted_rows_resample_in_time_order() {
        let input = series(&[(at(0, 50), "9"), (at(0, 0), "10"), (at(0, 10), "12")]);

        let candles = resample(&input, Interval::OneHour, Continuity::Observed);

        assert_eq!(candles, vec![Candle::new(at(0, 0), 10.0, 12.0, 9.0, 9.0, 3)]);
    }
}
