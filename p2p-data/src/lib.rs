/// P2P Data - Shared Library
///
/// Tracks the peer-to-peer USDT/VES exchange rate:
/// - fetch: advertised buy and sell prices, with retry and backoff
/// - aggregate: per-side statistics and the market median of one poll cycle
/// - store: append-only CSV file or SQLite table of poll cycles
/// - load: normalised, timezone-aware series for display
/// - resample: OHLC candles over the market median
/// - view: summary, trend, alerts and records table for the dashboard
/// - access: shared-secret gate for the dashboard
pub mod access;
pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod load;
pub mod resample;
pub mod store;
pub mod view;

// Re-export commonly used types for convenience
pub use aggregate::{AggregateRow, SideStats};
pub use error::{ConfigError, FetchError, LoadError, StoreError};
pub use fetch::{Fetcher, PriceSource, TradeType, binance::BinanceP2pClient, retry::RetryConfig};
pub use load::{DataSource, Observation, Series};
pub use resample::{Candle, Continuity, Interval};
pub use store::{CsvStore, RowStore, SqliteStore, StoreKind};
pub use view::{DashboardOptions, DashboardView};

/// Initialise `tracing` from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
