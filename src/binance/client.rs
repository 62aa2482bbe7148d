// =============================================================================
// Binance REST API Client: public daily klines
// =============================================================================
//
// Only the unsigned market-data endpoint is used: GET /api/v3/klines with a
// 1d interval. The lookback period is converted to a bar count and capped at
// the endpoint's maximum page size.
// =============================================================================

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::market_data::{Bar, BarSource, FetchError};
use crate::types::LookbackPeriod;

/// Production REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Largest `limit` accepted by /api/v3/klines.
const MAX_KLINES: u32 = 1000;

/// Binance REST client for public market data.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient` against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self { base_url, client })
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines (public, no signature required).
    ///
    /// Array indices of each kline:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, ...
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Bar>, FetchError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("interval", interval), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            // Unknown symbols come back as 400 {"code":-1121,"msg":"Invalid symbol."}
            let msg = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["msg"].as_str().map(str::to_string))
                .unwrap_or_else(|| "request rejected".to_string());
            return Err(FetchError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("Binance GET /api/v3/klines returned {status}: {msg}"),
            });
        }

        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| FetchError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("klines response is not valid JSON: {e}"),
            })?;

        let raw = body.as_array().ok_or_else(|| FetchError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "klines response is not an array".to_string(),
        })?;

        let mut bars = Vec::with_capacity(raw.len());

        for (index, entry) in raw.iter().enumerate() {
            let bar = Self::parse_kline(entry).map_err(|e| FetchError::MalformedBar {
                symbol: symbol.to_string(),
                index,
                reason: format!("{e:#}"),
            })?;
            bars.push(bar);
        }

        debug!(symbol, interval, count = bars.len(), "klines fetched");
        Ok(bars)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn parse_kline(entry: &serde_json::Value) -> anyhow::Result<Bar> {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 6 {
            anyhow::bail!("kline entry has {} elements, expected at least 6", arr.len());
        }

        let open_time = arr[0].as_i64().context("kline openTime is not an integer")?;
        let open = Self::parse_str_f64(&arr[1])?;
        let high = Self::parse_str_f64(&arr[2])?;
        let low = Self::parse_str_f64(&arr[3])?;
        let close = Self::parse_str_f64(&arr[4])?;
        let volume = Self::parse_str_f64(&arr[5])?;

        Ok(Bar::new(open_time, open, high, low, close, volume))
    }

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn parse_str_f64(val: &serde_json::Value) -> anyhow::Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

#[async_trait]
impl BarSource for BinanceClient {
    async fn fetch_bars(&self, symbol: &str, period: LookbackPeriod) -> Result<Vec<Bar>, FetchError> {
        let today = chrono::Utc::now().date_naive();
        let limit = period.approx_days(today).clamp(1, MAX_KLINES);
        self.get_klines(symbol, "1d", limit).await
    }

    fn name(&self) -> &'static str {
        "binance"
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kline(open_time: i64, close: &str) -> serde_json::Value {
        serde_json::json!([
            open_time, "100.0", "110.0", "90.0", close, "12.5",
            open_time + 86_399_999, "1250.0", 42, "6.0", "600.0", "0"
        ])
    }

    #[tokio::test]
    async fn fetch_bars_parses_klines() {
        let server = MockServer::start().await;
        let body = serde_json::json!([kline(0, "105.5"), kline(86_400_000, "107.25")]);
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("interval", "1d"))
            .and(query_param("limit", "365"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = BinanceClient::new(server.uri()).unwrap();
        let bars = client.fetch_bars("BTCUSDT", LookbackPeriod::Year1).await.unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 0);
        assert!((bars[0].close - 105.5).abs() < 1e-12);
        assert!((bars[1].close - 107.25).abs() < 1e-12);
        assert!((bars[1].volume - 12.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn long_periods_are_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("limit", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = BinanceClient::new(server.uri()).unwrap();
        let bars = client.fetch_bars("ETHUSDT", LookbackPeriod::Max).await.unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn invalid_symbol_is_data_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"code": -1121, "msg": "Invalid symbol."})),
            )
            .mount(&server)
            .await;

        let client = BinanceClient::new(server.uri()).unwrap();
        let err = client.fetch_bars("NOPE", LookbackPeriod::Year1).await.unwrap_err();
        assert!(matches!(err, FetchError::DataUnavailable { .. }), "got {err:?}");
        assert!(err.to_string().contains("Invalid symbol"));
    }

    #[tokio::test]
    async fn unparsable_close_is_malformed() {
        let server = MockServer::start().await;
        let body = serde_json::json!([kline(0, "101.0"), kline(86_400_000, "n/a")]);
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = BinanceClient::new(server.uri()).unwrap();
        let err = client.fetch_bars("BTCUSDT", LookbackPeriod::Month1).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedBar { index: 1, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_error_page_is_data_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let client = BinanceClient::new(server.uri()).unwrap();
        let err = client.fetch_bars("BTCUSDT", LookbackPeriod::Year1).await.unwrap_err();
        assert_eq!(err.kind(), "data_unavailable", "got {err:?}");
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn symbol_is_encoded_as_one_query_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("symbol", "BTC&limit=5"))
            .and(query_param("limit", "365"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = BinanceClient::new(server.uri()).unwrap();
        let bars = client.fetch_bars("BTC&limit=5", LookbackPeriod::Year1).await.unwrap();
        assert!(bars.is_empty());
    }
}
