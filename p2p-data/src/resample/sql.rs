use super::{Candle, Interval, utc_offset_secs};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, named_params};

// Buckets use the same alignment formula as `bucket_start`. Open and close are
// the first and last market median by (time, rowid) within the bucket.
const CANDLES: &str = "
    WITH parsed AS (
        SELECT rowid AS id,
               market_median,
               CAST(strftime('%s', datetime_utc) AS INTEGER) AS epoch
        FROM p2p_data
        WHERE market_median IS NOT NULL
          AND strftime('%s', datetime_utc) IS NOT NULL
    ),
    bucketed AS (
        SELECT id,
               epoch,
               market_median,
               ((epoch + :offset - :origin) / :width) * :width + :origin - :offset AS bucket
        FROM parsed
        WHERE epoch BETWEEN :from AND :to
    ),
    windowed AS (
        SELECT bucket,
               market_median,
               FIRST_VALUE(market_median) OVER bucket_window AS open,
               LAST_VALUE(market_median) OVER bucket_window AS close
        FROM bucketed
        WINDOW bucket_window AS (
            PARTITION BY bucket
            ORDER BY epoch, id
            ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING
        )
    )
    SELECT bucket,
           MIN(open),
           MAX(market_median),
           MIN(market_median),
           MIN(close),
           COUNT(*)
    FROM windowed
    GROUP BY bucket
    ORDER BY bucket
";

/// Aggregate candles inside SQLite.
///
/// `range` bounds the rows by UTC time, inclusive. The display timezone offset
/// is taken at the end of the range, or now when unbounded.
pub fn query_candles(
    conn: &Connection,
    interval: Interval,
    timezone: Tz,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<Vec<Candle>, StoreError> {
    let (from, to) = match range {
        Some((from, to)) => (from.timestamp(), to.timestamp()),
        None => (i64::MIN, i64::MAX),
    };
    let reference = range.map(|(_, to)| to).unwrap_or_else(Utc::now);
    let offset = utc_offset_secs(timezone, reference);

    let mut stmt = conn.prepare(CANDLES)?;
    let candles = stmt
        .query_map(
            named_params! {
                ":offset": offset,
                ":origin": interval.origin_secs(),
                ":width": interval.width_secs(),
                ":from": from,
                ":to": to,
            },
            |row| {
                let bucket: i64 = row.get(0)?;
                let samples: i64 = row.get(5)?;
                Ok((bucket, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, samples))
            },
        )?
        .filter_map(|row| match row {
            Ok((bucket, open, high, low, close, samples)) => DateTime::from_timestamp(bucket, 0)
                .map(|start| Ok(Candle::new(start, open, high, low, close, samples as usize))),
            Err(error) => Some(Err(error)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(candles)
}
