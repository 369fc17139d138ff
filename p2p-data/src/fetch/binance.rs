use crate::{
    error::FetchError,
    fetch::{PriceSource, SearchRequest},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Binance P2P advert search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search";

/// Per-request timeout used by the fetcher.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Binance P2P advert search response.
///
/// Only `data[].adv.price` is consumed. Items are kept as raw JSON so one odd
/// advert never fails decoding of the whole page.
///
/// ### Raw Payload Example
/// ```json
/// {
///     "code": "000000",
///     "data": [
///         {"adv": {"advNo": "11", "price": "36.512", "tradeType": "BUY"}},
///         {"adv": {"advNo": "12", "price": "1,036.60", "tradeType": "BUY"}}
///     ],
///     "success": true
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Option<Vec<serde_json::Value>>,
}

impl SearchResponse {
    /// Parse every advert price in the response, skipping malformed entries.
    pub fn prices(&self) -> Vec<f64> {
        let Some(items) = &self.data else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let raw = item.get("adv")?.get("price")?;
                let price = match raw {
                    serde_json::Value::String(price) => parse_price(price),
                    serde_json::Value::Number(price) => price.as_f64().filter(|p| p.is_finite()),
                    _ => None,
                };
                if price.is_none() {
                    debug!(?raw, "skipping malformed advert price");
                }
                price
            })
            .collect()
    }
}

/// Parse an advert price string, removing thousands separators first.
pub fn parse_price(raw: &str) -> Option<f64> {
    let normalised = raw.trim().replace(',', "");
    if normalised.is_empty() {
        return None;
    }
    normalised.parse::<f64>().ok().filter(|price| price.is_finite())
}

/// [`PriceSource`] backed by the public Binance P2P HTTP endpoint.
#[derive(Debug, Clone)]
pub struct BinanceP2pClient {
    client: reqwest::Client,
    url: String,
}

impl BinanceP2pClient {
    /// Construct a client for `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PriceSource for BinanceP2pClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        response.json::<SearchResponse>().await.map_err(|error| FetchError::Decode(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        struct TestCase {
            input: &'static str,
            expected: Option<f64>,
        }

        let tests = vec![
            TestCase {
                // TC0: plain decimal
                input: "36.51",
                expected: Some(36.51),
            },
            TestCase {
                // TC1: thousands separator removed
                input: "1,036.60",
                expected: Some(1036.60),
            },
            TestCase {
                // TC2: surrounding whitespace
                input: " 40.1 ",
                expected: Some(40.1),
            },
            TestCase {
                // TC3: empty
                input: "",
                expected: None,
            },
            TestCase {
                // TC4: non-numeric after separator removal
                input: "abc,def",
                expected: None,
            },
            TestCase {
                // TC5: non-finite
                input: "NaN",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = parse_price(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_response_prices_skip_malformed_entries() {
        let input = r#"
        {
            "code": "000000",
            "data": [
                {"adv": {"price": "36.50"}},
                {"adv": {"price": "not-a-price"}},
                {"adv": {}},
                {"other": 1},
                {"adv": {"price": "1,037.25"}},
                {"adv": {"price": 37.0}},
                {"adv": {"price": ""}}
            ]
        }
        "#;

        let response = serde_json::from_str::<SearchResponse>(input).unwrap();

        assert_eq!(response.prices(), vec![36.50, 1037.25, 37.0]);
    }

    #[test]
    fn test_response_without_data() {
        struct TestCase {
            input: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: data field missing
                input: r#"{"code": "000000"}"#,
            },
            TestCase {
                // TC1: data field null
                input: r#"{"code": "000000", "data": null}"#,
            },
            TestCase {
                // TC2: data field empty
                input: r#"{"code": "000000", "data": []}"#,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let response = serde_json::from_str::<SearchResponse>(test.input).unwrap();
            assert!(response.prices().is_empty(), "TC{} failed", index);
        }
    }
}
