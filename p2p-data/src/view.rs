//! Dashboard pipeline: one configurable transformation from a loaded
//! [`Series`] to everything the dashboard renders.

use crate::{
    error::LoadError,
    load::{DataSource, Observation, Series},
    resample::{Candle, Continuity, Interval, candles_for, resample},
};
use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

/// Default trailing window applied when loading.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Longest trailing window a client may request.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Default distance below the 30 minute mean that triggers the buy alert.
pub const DEFAULT_BUY_ALERT_PCT: f64 = 0.5;

const BUY_ALERT_WINDOW: TimeDelta = TimeDelta::minutes(30);
const WEEKLY_ALERT_WINDOW: TimeDelta = TimeDelta::days(7);

/// User and deployment choices applied to a loaded series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOptions {
    /// Trailing window in days, `None` for the full history.
    pub window_days: Option<u32>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub interval: Interval,
    pub continuity: Continuity,
    pub buy_alert_pct: f64,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            window_days: Some(DEFAULT_WINDOW_DAYS),
            from: None,
            to: None,
            interval: Interval::default(),
            continuity: Continuity::default(),
            buy_alert_pct: DEFAULT_BUY_ALERT_PCT,
        }
    }
}

impl DashboardOptions {
    pub fn window(&self) -> Option<TimeDelta> {
        self.window_days.map(|days| TimeDelta::days(i64::from(days)))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
pub enum Trend {
    Up,
    Down,
    Flat,
    Insufficient,
}

impl Trend {
    /// Compare the two most recent values, newest first.
    pub fn from_recent(mut newest_first: impl Iterator<Item = f64>) -> Self {
        match (newest_first.next(), newest_first.next()) {
            (Some(latest), Some(previous)) if latest > previous => Trend::Up,
            (Some(latest), Some(previous)) if latest < previous => Trend::Down,
            (Some(_), Some(_)) => Trend::Flat,
            _ => Trend::Insufficient,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Latest market median inside the selected date range.
    pub last: Option<f64>,
    pub historical_max: Option<f64>,
    pub historical_min: Option<f64>,
    pub trend: Trend,
}

/// Latest price compared with a trailing mean.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub last: f64,
    pub average: f64,
    /// Price below which the alert triggers.
    pub threshold: f64,
    pub triggered: bool,
}

impl Alert {
    fn below(last: f64, average: f64, threshold: f64) -> Self {
        Self {
            last,
            average,
            threshold,
            triggered: last < threshold,
        }
    }
}

/// One line of the records table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    #[serde(rename = "Fecha")]
    pub fecha: NaiveDate,
    #[serde(rename = "Hora")]
    pub hora: String,
    pub asset: Option<String>,
    pub fiat: Option<String>,
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

impl From<&Observation> for TableRow {
    fn from(observation: &Observation) -> Self {
        Self {
            fecha: observation.date(),
            hora: observation.time_of_day(),
            asset: observation.asset.clone(),
            fiat: observation.fiat.clone(),
            buy_min: observation.buy_min,
            buy_max: observation.buy_max,
            buy_median: observation.buy_median,
            buy_avg: observation.buy_avg,
            sell_min: observation.sell_min,
            sell_max: observation.sell_max,
            sell_median: observation.sell_median,
            sell_avg: observation.sell_avg,
            market_median: observation.market_median,
        }
    }
}

/// Everything the dashboard renders for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    /// First and last display date available for selection.
    pub available: (NaiveDate, NaiveDate),
    /// Date range actually shown.
    pub selected: (NaiveDate, NaiveDate),
    pub interval: Interval,
    pub continuity: Continuity,
    pub summary: Summary,
    pub buy_alert: Option<Alert>,
    pub weekly_alert: Option<Alert>,
    pub candles: Vec<Candle>,
    /// Newest first.
    pub rows: Vec<TableRow>,
}

impl DashboardView {
    /// True when the selected date range contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Available and selected date ranges for `series`.
///
/// Requested bounds are clamped to the available range; a missing bound
/// defaults to the matching end of it.
pub fn date_range(series: &Series, options: &DashboardOptions) -> Option<((NaiveDate, NaiveDate), (NaiveDate, NaiveDate))> {
    let available = (series.first()?.date(), series.latest()?.date());

    let from = options.from.unwrap_or(available.0).clamp(available.0, available.1);
    let to = options.to.unwrap_or(available.1).clamp(available.0, available.1);

    Some((available, (from, to)))
}

/// Rows of `series` inside the selected date range.
pub fn select(series: &Series, options: &DashboardOptions) -> Series {
    match date_range(series, options) {
        Some((_, (from, to))) => series.between_dates(from, to),
        None => series.clone(),
    }
}

/// Build the view, resampling candles in memory.
///
/// Returns [`LoadError::EmptyData`] for an empty series.
pub fn build(series: &Series, options: &DashboardOptions) -> Result<DashboardView, LoadError> {
    let selected = select(series, options);
    let candles = resample(&selected, options.interval, options.continuity);
    assemble(series, &selected, candles, options)
}

/// Build the view, aggregating candles where `source` is able to.
pub async fn build_from_source(
    source: &DataSource,
    series: &Series,
    options: &DashboardOptions,
) -> Result<DashboardView, LoadError> {
    let selected = select(series, options);
    let candles = candles_for(source, &selected, options.interval, options.continuity).await?;
    assemble(series, &selected, candles, options)
}

fn assemble(
    series: &Series,
    selected: &Series,
    candles: Vec<Candle>,
    options: &DashboardOptions,
) -> Result<DashboardView, LoadError> {
    let (available, selected_range) = date_range(series, options).ok_or(LoadError::EmptyData)?;

    let summary = Summary {
        last: selected.market_medians().next_back().map(|(_, value)| value),
        historical_max: series.market_medians().map(|(_, value)| value).reduce(f64::max),
        historical_min: series.market_medians().map(|(_, value)| value).reduce(f64::min),
        trend: Trend::from_recent(selected.market_medians().rev().map(|(_, value)| value)),
    };

    Ok(DashboardView {
        available,
        selected: selected_range,
        interval: options.interval,
        continuity: options.continuity,
        summary,
        buy_alert: buy_alert(series, options.buy_alert_pct),
        weekly_alert: weekly_alert(series),
        candles,
        rows: selected.observations().iter().rev().map(TableRow::from).collect(),
    })
}

/// Latest price against the mean of the 30 minutes before the latest row.
///
/// Triggers when the price is at least `pct` percent below that mean.
pub fn buy_alert(series: &Series, pct: f64) -> Option<Alert> {
    let (last, average) = last_and_mean(series, BUY_ALERT_WINDOW)?;
    Some(Alert::below(last, average, average * (1.0 - pct / 100.0)))
}

/// Latest price against the mean of the 7 days before the latest row.
pub fn weekly_alert(series: &Series) -> Option<Alert> {
    let (last, average) = last_and_mean(series, WEEKLY_ALERT_WINDOW)?;
    Some(Alert::below(last, average, average))
}

fn last_and_mean(series: &Series, window: TimeDelta) -> Option<(f64, f64)> {
    let last = series.market_medians().next_back().map(|(_, value)| value)?;

    let trailing = series.trailing(window);
    let (sum, count) = trailing
        .market_medians()
        .fold((0.0, 0_usize), |(sum, count), (_, value)| (sum + value, count + 1));

    (count > 0).then(|| (last, sum / count as f64))
}
