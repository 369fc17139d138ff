use p2p_data::{LoadError, Series, access::AccessGate, cache::TtlCache, config::DashboardConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// Arguments a load is cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadKey {
    pub source: String,
    pub window_days: Option<u32>,
}

/// Shared state behind every handler.
#[derive(Debug)]
pub struct AppState {
    pub config: DashboardConfig,
    pub gate: AccessGate,
    cache: TtlCache<LoadKey, Arc<Series>>,
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Arc<Self> {
        Arc::new(Self {
            gate: AccessGate::new(&config.password),
            cache: TtlCache::new(config.cache_ttl),
            config,
        })
    }

    /// Trailing window requested by the client, else the configured one.
    ///
    /// Zero selects the full history.
    pub fn window_days(&self, requested: Option<u32>) -> Option<u32> {
        Some(requested.unwrap_or(self.config.window_days)).filter(|days| *days > 0)
    }

    /// Load the series restricted to `window_days`, served from cache when fresh.
    pub async fn series(&self, window_days: Option<u32>) -> Result<Arc<Series>, LoadError> {
        let key = LoadKey {
            source: self.config.source.to_string(),
            window_days,
        };

        if let Some(series) = self.cache.get(&key) {
            debug!(source = %key.source, ?window_days, "serving cached series");
            return Ok(series);
        }

        let mut series = self.config.source.load(self.config.timezone).await?;
        if let Some(days) = window_days {
            series = series.trailing(chrono::TimeDelta::days(i64::from(days)));
        }

        info!(source = %key.source, ?window_days, rows = series.len(), "loaded series");
        let series = Arc::new(series);
        self.cache.insert(key, Arc::clone(&series));
        Ok(series)
    }
}
