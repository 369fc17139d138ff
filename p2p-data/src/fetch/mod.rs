//! Advert price fetching.
//!
//! A [`Fetcher`] drives a [`PriceSource`] with exponential backoff and
//! degrades to "no samples" rather than failing the poll cycle.

use crate::{
    aggregate::AggregateRow,
    error::FetchError,
    fetch::{binance::SearchResponse, retry::RetryConfig},
};
use async_trait::async_trait;
use chrono::Utc;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Binance P2P HTTP source and response parsing.
pub mod binance;

/// Backoff policy between failed attempts.
pub mod retry;

/// Default number of advert rows requested per side.
pub const DEFAULT_ROWS: u32 = 20;

/// Direction of the advertised orders being requested.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum TradeType {
    #[serde(rename = "BUY")]
    #[display("BUY")]
    Buy,
    #[serde(rename = "SELL")]
    #[display("SELL")]
    Sell,
}

/// Advert search request body.
///
/// ### Payload Example
/// ```json
/// {"asset": "USDT", "fiat": "VES", "tradeType": "BUY", "page": 1, "rows": 20, "merchantCheck": false}
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub asset: String,
    pub fiat: String,
    pub trade_type: TradeType,
    pub page: u32,
    pub rows: u32,
    pub merchant_check: bool,
}

impl SearchRequest {
    /// First page of `rows` adverts, merchant check disabled.
    pub fn new(asset: impl Into<String>, fiat: impl Into<String>, trade_type: TradeType, rows: u32) -> Self {
        Self {
            asset: asset.into(),
            fiat: fiat.into(),
            trade_type,
            page: 1,
            rows,
            merchant_check: false,
        }
    }
}

/// Transport capable of executing an advert search.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchError>;
}

/// Polls a [`PriceSource`] for both sides of the book and aggregates the result.
#[derive(Debug, Clone)]
pub struct Fetcher<Source> {
    source: Source,
    retry: RetryConfig,
    rows: u32,
}

impl<Source> Fetcher<Source>
where
    Source: PriceSource,
{
    pub fn new(source: Source, retry: RetryConfig, rows: u32) -> Self {
        Self { source, retry, rows }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Fetch the advertised prices for one side.
    ///
    /// Every failed attempt, the last included, is followed by its backoff
    /// wait. Returns an empty list once every attempt has failed; callers treat
    /// that as "no data" for the side.
    pub async fn fetch_prices(&self, asset: &str, fiat: &str, trade_type: TradeType) -> Vec<f64> {
        let request = SearchRequest::new(asset, fiat, trade_type, self.rows);

        for attempt in 0..self.retry.max_attempts {
            match self.source.search(&request).await {
                Ok(response) => return response.prices(),
                Err(error) => {
                    let wait = self.retry.delay_for_attempt(attempt);
                    if self.retry.has_next(attempt) {
                        warn!(
                            %trade_type,
                            attempt = attempt + 1,
                            %error,
                            "advert search failed, retrying in {:.1}s",
                            wait.as_secs_f64()
                        );
                    } else {
                        warn!(
                            %trade_type,
                            attempt = attempt + 1,
                            %error,
                            "advert search failed, giving up in {:.1}s",
                            wait.as_secs_f64()
                        );
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }

        warn!(%trade_type, asset, fiat, "advert search attempts exhausted, side has no samples");
        Vec::new()
    }

    /// Run one poll cycle: buy side, then sell side, then aggregate.
    pub async fn build_row(&self, asset: &str, fiat: &str) -> AggregateRow {
        let now = Utc::now();
        let buy = self.fetch_prices(asset, fiat, TradeType::Buy).await;
        let sell = self.fetch_prices(asset, fiat, TradeType::Sell).await;

        info!(asset, fiat, buy = buy.len(), sell = sell.len(), "collected advert prices");

        AggregateRow::from_samples(now, asset, fiat, &buy, &sell)
    }
}
