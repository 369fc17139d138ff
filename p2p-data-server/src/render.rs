//! Server-side HTML for the dashboard and login pages.

use chrono::NaiveDate;
use p2p_data::{
    Candle, Continuity, DashboardOptions, DashboardView, Interval, Series,
    view::{Alert, TableRow, Trend},
};
use std::fmt::Write;

const CHART_WIDTH: f64 = 960.0;
const CHART_HEIGHT: f64 = 320.0;
const CHART_PADDING: f64 = 24.0;

const STYLE: &str = "
body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 1040px; color: #1d2330; }
h1 { font-size: 1.6rem; }
form.controls { display: flex; flex-wrap: wrap; gap: 1rem; align-items: end; margin-bottom: 1.5rem; }
.metrics { display: flex; gap: 1.5rem; }
.metric { flex: 1; padding: 1rem; border: 1px solid #d8dce5; border-radius: 6px; }
.metric strong { display: block; font-size: 1.3rem; }
.notice { padding: .75rem 1rem; border-radius: 6px; margin: .5rem 0; background: #eef1f7; }
.notice.good { background: #e3f6e8; }
.notice.warn { background: #fdf1dc; }
.notice.error { background: #fbe3e3; }
table { border-collapse: collapse; width: 100%; font-size: .85rem; }
th, td { border-bottom: 1px solid #e4e7ee; padding: .3rem .5rem; text-align: right; }
th:nth-child(-n+4), td:nth-child(-n+4) { text-align: left; }
svg { width: 100%; height: auto; background: #fafbfd; border: 1px solid #e4e7ee; }
";

pub fn login_page(failed: bool) -> String {
    let notice = if failed {
        r#"<p class="notice error">Incorrect password.</p>"#
    } else {
        ""
    };

    page(
        "Sign in",
        &format!(
            r#"<h1>P2P USDT/VES</h1>
{notice}
<form method="post" action="/login">
  <label>Password <input type="password" name="password" autofocus></label>
  <button type="submit">Enter</button>
</form>"#
        ),
    )
}

/// Page shown when the series could not be loaded.
pub fn error_page(message: &str, logout: bool) -> String {
    page(
        "P2P USDT/VES",
        &format!(
            r#"<h1>P2P USDT/VES</h1>
{}
<p class="notice error">Error loading data: {}</p>"#,
            logout_form(logout),
            escape(message)
        ),
    )
}

pub fn dashboard_page(view: &DashboardView, selected: &Series, options: &DashboardOptions, logout: bool) -> String {
    let mut body = String::new();
    let _ = write!(body, "<h1>P2P USDT/VES</h1>\n{}\n", logout_form(logout));
    body.push_str(&controls(view, options));

    if view.is_empty() {
        body.push_str(r#"<p class="notice">No data in the selected date range.</p>"#);
        return page("P2P USDT/VES", &body);
    }

    body.push_str("<h2>Trend (market median)</h2>\n");
    body.push_str(&line_chart(selected));
    body.push_str(&metrics(view));
    body.push_str(&trend_and_alerts(view));

    let _ = write!(
        body,
        "<h2>Candles ({}, {})</h2>\n{}",
        view.interval.label(),
        view.continuity,
        candle_chart(&view.candles)
    );

    body.push_str("<h2>Records</h2>\n");
    body.push_str(&table(&view.rows));
    body.push_str(r#"<p><small>Binance P2P advert prices, sampled every 30 minutes.</small></p>"#);

    page("P2P USDT/VES", &body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{}</title><style>{STYLE}</style></head>
<body>
{body}
</body>
</html>"#,
        escape(title)
    )
}

fn logout_form(enabled: bool) -> &'static str {
    if enabled {
        r#"<form method="post" action="/logout"><button type="submit">Log out</button></form>"#
    } else {
        ""
    }
}

fn controls(view: &DashboardView, options: &DashboardOptions) -> String {
    let (min, max) = view.available;
    let (from, to) = view.selected;

    let intervals = Interval::ALL
        .iter()
        .map(|interval| {
            let selected = if *interval == options.interval { " selected" } else { "" };
            format!(r#"<option value="{interval}"{selected}>{}</option>"#, interval.label())
        })
        .collect::<String>();

    let forced = if options.continuity == Continuity::Forced { " checked" } else { "" };

    format!(
        r#"<form class="controls" method="get" action="/">
  <label>From <input type="date" name="from" value="{from}" min="{min}" max="{max}"></label>
  <label>To <input type="date" name="to" value="{to}" min="{min}" max="{max}"></label>
  <label>Interval <select name="interval">{intervals}</select></label>
  <label>Window (days) <input type="number" name="window_days" min="0" value="{}"></label>
  <label><input type="checkbox" name="continuity" value="forced"{forced}> Continuous candles</label>
  <button type="submit">Apply</button>
</form>
"#,
        options.window_days.unwrap_or(0)
    )
}

fn metrics(view: &DashboardView) -> String {
    let metric = |label: &str, value: Option<f64>| {
        format!(
            r#"<div class="metric">{label}<strong>{}</strong></div>"#,
            value.map_or_else(|| "N/A".to_string(), |value| format!("{value:.3} VES/USDT"))
        )
    };

    format!(
        r#"<div class="metrics">{}{}{}</div>
"#,
        metric("Last value", view.summary.last),
        metric("Historical max", view.summary.historical_max),
        metric("Historical min", view.summary.historical_min),
    )
}

fn trend_and_alerts(view: &DashboardView) -> String {
    let trend = match view.summary.trend {
        Trend::Up => r#"<p class="notice good">Current trend: rising</p>"#,
        Trend::Down => r#"<p class="notice warn">Current trend: falling</p>"#,
        Trend::Flat => r#"<p class="notice">Current trend: flat</p>"#,
        Trend::Insufficient => r#"<p class="notice">Not enough points to determine a trend.</p>"#,
    };

    let buy = match view.buy_alert {
        Some(Alert {
            last,
            average,
            triggered: true,
            ..
        }) => format!(
            r#"<p class="notice good">Price {last:.3} is well below the 30 minute average {average:.3}: good time to buy dollars.</p>"#
        ),
        Some(Alert { last, average, .. }) => format!(
            r#"<p class="notice">Price {last:.3} is within the normal range of the 30 minute average {average:.3}.</p>"#
        ),
        None => r#"<p class="notice">Not enough data in the last 30 minutes to evaluate the buy alert.</p>"#.to_string(),
    };

    let weekly = match view.weekly_alert {
        Some(Alert {
            last,
            average,
            triggered: true,
            ..
        }) => format!(r#"<p class="notice warn">Current price {last:.3} is below the 7 day average {average:.3}.</p>"#),
        Some(Alert { last, average, .. }) => {
            format!(r#"<p class="notice">Current price {last:.3} vs 7 day average {average:.3}.</p>"#)
        }
        None => String::new(),
    };

    format!("<h2>Trend and alerts</h2>\n{trend}\n{buy}\n{weekly}\n")
}

fn table(rows: &[TableRow]) -> String {
    let mut html = String::from(
        "<table>\n<thead><tr><th>Fecha</th><th>Hora</th><th>asset</th><th>fiat</th>\
         <th>buy_min</th><th>buy_max</th><th>buy_median</th><th>buy_avg</th>\
         <th>sell_min</th><th>sell_max</th><th>sell_median</th><th>sell_avg</th>\
         <th>market_median</th></tr></thead>\n<tbody>\n",
    );

    for row in rows {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
            date(row.fecha),
            escape(&row.hora),
            escape(row.asset.as_deref().unwrap_or("")),
            escape(row.fiat.as_deref().unwrap_or("")),
        );
        for value in [
            row.buy_min,
            row.buy_max,
            row.buy_median,
            row.buy_avg,
            row.sell_min,
            row.sell_max,
            row.sell_median,
            row.sell_avg,
            row.market_median,
        ] {
            let _ = write!(html, "<td>{}</td>", number(value));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

/// Vertical scale mapping `[low, high]` onto the chart height.
struct Scale {
    low: f64,
    span: f64,
}

impl Scale {
    fn new(low: f64, high: f64) -> Self {
        let span = if high > low { high - low } else { 1.0 };
        Self { low, span }
    }

    fn y(&self, value: f64) -> f64 {
        CHART_HEIGHT - CHART_PADDING - (value - self.low) / self.span * (CHART_HEIGHT - 2.0 * CHART_PADDING)
    }
}

fn x_step(count: usize) -> f64 {
    (CHART_WIDTH - 2.0 * CHART_PADDING) / count.max(1) as f64
}

fn line_chart(series: &Series) -> String {
    let points = series.market_medians().map(|(_, value)| value).collect::<Vec<_>>();
    let Some(scale) = bounds(points.iter().copied()).map(|(low, high)| Scale::new(low, high)) else {
        return String::new();
    };

    let step = x_step(points.len().saturating_sub(1));
    let path = points
        .iter()
        .enumerate()
        .map(|(index, value)| format!("{:.1},{:.1}", CHART_PADDING + index as f64 * step, scale.y(*value)))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r##"<svg viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" role="img"><polyline fill="none" stroke="#2f6fde" stroke-width="1.5" points="{path}"/></svg>
"##
    )
}

fn candle_chart(candles: &[Candle]) -> String {
    let Some((low, high)) = bounds(candles.iter().flat_map(|candle| [candle.low, candle.high, candle.open])) else {
        return String::new();
    };
    let scale = Scale::new(low, high);
    let step = x_step(candles.len());
    let body_width = (step * 0.6).max(1.0);

    let mut svg = format!(r#"<svg viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" role="img">"#);
    for (index, candle) in candles.iter().enumerate() {
        let centre = CHART_PADDING + (index as f64 + 0.5) * step;
        let colour = if candle.close >= candle.open { "#1f9d55" } else { "#d64545" };
        let top = scale.y(candle.open.max(candle.close));
        let bottom = scale.y(candle.open.min(candle.close));
        let wick_top = scale.y(candle.high.max(candle.open));
        let wick_bottom = scale.y(candle.low.min(candle.open));

        let _ = write!(
            svg,
            r#"<g><title>{} O {:.3} H {:.3} L {:.3} C {:.3}</title><line x1="{centre:.1}" x2="{centre:.1}" y1="{wick_top:.1}" y2="{wick_bottom:.1}" stroke="{colour}"/><rect x="{:.1}" y="{top:.1}" width="{body_width:.1}" height="{:.1}" fill="{colour}"/></g>"#,
            candle.start.format("%Y-%m-%d %H:%M UTC"),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            centre - body_width / 2.0,
            (bottom - top).max(1.0),
        );
    }
    svg.push_str("</svg>\n");
    svg
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |bounds, value| match bounds {
        None => Some((value, value)),
        Some((low, high)) => Some((low.min(value), high.max(value))),
    })
}

fn date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn number(value: Option<f64>) -> String {
    value.map(|value| format!("{value:.3}")).unwrap_or_default()
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
