//! Environment driven configuration for the fetcher and the dashboard.
//!
//! Unset or blank variables fall back to defaults, as do unparsable numbers.
//! Values that select behaviour (store kind, data source, timezone, listen
//! address) fail loudly instead.

use crate::{
    cache::{MAX_TTL, MIN_TTL},
    error::ConfigError,
    fetch::{
        DEFAULT_ROWS,
        binance::{DEFAULT_SEARCH_URL, DEFAULT_TIMEOUT},
        retry::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS, RetryConfig},
    },
    load::{DISPLAY_TIMEZONE, DataSource},
    store::StoreKind,
    view::{DEFAULT_BUY_ALERT_PCT, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS},
};
use chrono_tz::Tz;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub const DEFAULT_CSV_PATH: &str = "data/p2p_ves_usdt.csv";
pub const DEFAULT_SQLITE_PATH: &str = "data/p2p.db";
pub const DEFAULT_DASHBOARD_ADDR: &str = "0.0.0.0:8080";

/// Configuration of one `p2p-fetch` cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub url: String,
    pub asset: String,
    pub fiat: String,
    pub rows: u32,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub store: StoreKind,
}

impl FetchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&Vars::new(|name| std::env::var(name).ok()))
    }

    fn from_vars<F>(vars: &Vars<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match vars.str("P2P_STORE", "csv").to_ascii_lowercase().as_str() {
            "csv" => StoreKind::Csv(vars.path("P2P_DATA_PATH", DEFAULT_CSV_PATH)),
            "sqlite" => StoreKind::Sqlite(vars.path("P2P_SQLITE_PATH", DEFAULT_SQLITE_PATH)),
            other => return Err(invalid("P2P_STORE", other)),
        };

        let backoff_base = vars.f64("P2P_BACKOFF_BASE", DEFAULT_BACKOFF_BASE);
        if backoff_base <= 0.0 {
            return Err(invalid("P2P_BACKOFF_BASE", &backoff_base.to_string()));
        }

        Ok(Self {
            url: vars.str("P2P_URL", DEFAULT_SEARCH_URL),
            asset: vars.str("P2P_ASSET", "USDT"),
            fiat: vars.str("P2P_FIAT", "VES"),
            rows: vars.u32("P2P_ROWS", DEFAULT_ROWS),
            timeout: Duration::from_secs(vars.u64("P2P_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())),
            retry: RetryConfig::new(
                vars.u32("P2P_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).max(1),
                Duration::from_secs(1),
                backoff_base,
            ),
            store,
        })
    }
}

/// Configuration of the dashboard server.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub addr: SocketAddr,
    pub source: DataSource,
    /// Empty disables the access gate.
    pub password: String,
    pub cache_ttl: Duration,
    pub timezone: Tz,
    /// Trailing window in days, `0` loads the full history. Capped at
    /// [`MAX_WINDOW_DAYS`].
    pub window_days: u32,
    pub buy_alert_pct: f64,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&Vars::new(|name| std::env::var(name).ok()))
    }

    fn from_vars<F>(vars: &Vars<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = vars.str("DASHBOARD_ADDR", DEFAULT_DASHBOARD_ADDR);
        let addr = addr.parse().map_err(|_| invalid("DASHBOARD_ADDR", &addr))?;

        let source = vars.str("DASHBOARD_SOURCE", DEFAULT_CSV_PATH);
        let source = source.parse().map_err(|_| invalid("DASHBOARD_SOURCE", &source))?;

        let timezone = vars.str("DASHBOARD_TIMEZONE", DISPLAY_TIMEZONE.name());
        let timezone = timezone.parse().map_err(|_| invalid("DASHBOARD_TIMEZONE", &timezone))?;

        let cache_ttl = Duration::from_secs(vars.u64("DASHBOARD_CACHE_TTL_SECS", MIN_TTL.as_secs()))
            .clamp(MIN_TTL, MAX_TTL);

        Ok(Self {
            addr,
            source,
            password: vars.raw("DASHBOARD_PASSWORD").unwrap_or_default(),
            cache_ttl,
            timezone,
            window_days: vars.u32("DASHBOARD_WINDOW_DAYS", DEFAULT_WINDOW_DAYS).min(MAX_WINDOW_DAYS),
            buy_alert_pct: vars.f64("DASHBOARD_BUY_ALERT_PCT", DEFAULT_BUY_ALERT_PCT),
        })
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Typed access to variables from a lookup function.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self { lookup }
    }

    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn str(&self, name: &str, default: &str) -> String {
        self.raw(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, name: &str, default: u64) -> u64 {
        self.raw(name)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    fn u32(&self, name: &str, default: u32) -> u32 {
        self.raw(name)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    fn f64(&self, name: &str, default: f64) -> f64 {
        self.raw(name)
            .and_then(|s| s.trim().parse().ok())
            .filter(|value: &f64| value.is_finite())
            .unwrap_or(default)
    }

    fn path(&self, name: &str, default: &str) -> PathBuf {
        PathBuf::from(self.str(name, default))
    }
}
