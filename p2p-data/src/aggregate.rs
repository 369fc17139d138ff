//! Summary statistics for one poll cycle.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Count, median, mean, min and max over one side's advert prices.
///
/// Every statistic is `None` when the side produced no samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct SideStats {
    pub count: u32,
    pub median: Option<f64>,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SideStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            count: sorted.len() as u32,
            median: median_sorted(&sorted),
            avg: Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Median of an ascending slice, averaging the two middle values for even lengths.
fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let len = sorted.len();
    match len {
        0 => None,
        _ if len % 2 == 1 => Some(sorted[len / 2]),
        _ => Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0),
    }
}

/// Representative rate: midpoint of both medians, or whichever side is present.
pub fn market_median(buy_median: Option<f64>, sell_median: Option<f64>) -> Option<f64> {
    match (buy_median, sell_median) {
        (Some(buy), Some(sell)) => Some((buy + sell) / 2.0),
        (Some(buy), None) => Some(buy),
        (None, Some(sell)) => Some(sell),
        (None, None) => None,
    }
}

/// One summary record per poll cycle, identified by its timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregateRow {
    pub datetime_utc: DateTime<Utc>,
    pub asset: String,
    pub fiat: String,
    pub buy: SideStats,
    pub sell: SideStats,
    pub market_median: Option<f64>,
}

impl AggregateRow {
    pub fn from_samples(
        datetime_utc: DateTime<Utc>,
        asset: impl Into<String>,
        fiat: impl Into<String>,
        buy: &[f64],
        sell: &[f64],
    ) -> Self {
        let buy = SideStats::from_samples(buy);
        let sell = SideStats::from_samples(sell);

        Self {
            datetime_utc,
            asset: asset.into(),
            fiat: fiat.into(),
            market_median: market_median(buy.median, sell.median),
            buy,
            sell,
        }
    }

    /// ISO-8601 timestamp with an explicit `+00:00` offset, as stored.
    pub fn timestamp_string(&self) -> String {
        self.datetime_utc.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// Flat record in store column order.
    pub fn to_record(&self) -> RowRecord {
        RowRecord {
            datetime_utc: self.timestamp_string(),
            asset: self.asset.clone(),
            fiat: self.fiat.clone(),
            buy_count: self.buy.count,
            buy_median: self.buy.median,
            buy_avg: self.buy.avg,
            buy_min: self.buy.min,
            buy_max: self.buy.max,
            sell_count: self.sell.count,
            sell_median: self.sell.median,
            sell_avg: self.sell.avg,
            sell_min: self.sell.min,
            sell_max: self.sell.max,
            market_median: self.market_median,
        }
    }
}

/// Store column names, in order.
pub const COLUMNS: [&str; 14] = [
    "datetime_utc",
    "asset",
    "fiat",
    "buy_count",
    "buy_median",
    "buy_avg",
    "buy_min",
    "buy_max",
    "sell_count",
    "sell_median",
    "sell_avg",
    "sell_min",
    "sell_max",
    "market_median",
];

/// Flattened [`AggregateRow`] matching [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RowRecord {
    pub datetime_utc: String,
    pub asset: String,
    pub fiat: String,
    pub buy_count: u32,
    pub buy_median: Option<f64>,
    pub buy_avg: Option<f64>,
    pub buy_min: Option<f64>,
    pub buy_max: Option<f64>,
    pub sell_count: u32,
    pub sell_median: Option<f64>,
    pub sell_avg: Option<f64>,
    pub sell_min: Option<f64>,
    pub sell_max: Option<f64>,
    pub market_median: Option<f64>,
}

impl RowRecord {
    /// Cell text for `column`, empty for absent values and unknown columns.
    pub fn cell(&self, column: &str) -> String {
        fn opt(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        match column {
            "datetime_utc" => self.datetime_utc.clone(),
            "asset" => self.asset.clone(),
            "fiat" => self.fiat.clone(),
            "buy_count" => self.buy_count.to_string(),
            "buy_median" => opt(self.buy_median),
            "buy_avg" => opt(self.buy_avg),
            "buy_min" => opt(self.buy_min),
            "buy_max" => opt(self.buy_max),
            "sell_count" => self.sell_count.to_string(),
            "sell_median" => opt(self.sell_median),
            "sell_avg" => opt(self.sell_avg),
            "sell_min" => opt(self.sell_min),
            "sell_max" => opt(self.sell_max),
            "market_median" => opt(self.market_median),
            _ => String::new(),
        }
    }

    /// Cells in [`COLUMNS`] order.
    pub fn cells(&self) -> Vec<String> {
        COLUMNS.iter().map(|column| self.cell(column)).collect()
    }
}
