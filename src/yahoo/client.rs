// =============================================================================
// Yahoo Finance Chart Client: daily bars for equities and indices
// =============================================================================
//
// GET {base}/v8/finance/chart/{symbol}?range={period}&interval=1d
//
// The chart payload is column-oriented: one `timestamp` array plus parallel
// open/high/low/close/volume arrays whose entries may be null. Rows where every
// price is null are non-trading placeholders and are dropped. A row with a
// null close but other prices present is treated as malformed.
//
// Closes are the raw (unadjusted) closes from the `quote` block.
// =============================================================================

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::market_data::{Bar, BarSource, FetchError};
use crate::types::LookbackPeriod;

/// Production chart host.
pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// The chart endpoint rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartData>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Yahoo Finance chart API client.
#[derive(Debug, Clone)]
pub struct YahooClient {
    base_url: Url,
    client: reqwest::Client,
}

impl YahooClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid Yahoo base URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Yahoo base URL '{base_url}' cannot carry a path");
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "YahooClient initialised");
        Ok(Self { base_url, client })
    }

    fn chart_url(&self, symbol: &str, period: LookbackPeriod) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", symbol]);
        }
        url.query_pairs_mut()
            .append_pair("range", period.as_str())
            .append_pair("interval", "1d");
        url
    }

    /// Fetch daily bars for `symbol` covering `period`.
    #[instrument(skip(self), name = "yahoo::get_chart")]
    pub async fn get_chart(&self, symbol: &str, period: LookbackPeriod) -> Result<Vec<Bar>, FetchError> {
        let url = self.chart_url(symbol, period);

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let parsed: Option<ChartResponse> = serde_json::from_str(&text).ok();

        if let Some(err) = parsed.as_ref().and_then(|p| p.chart.error.as_ref()) {
            return Err(FetchError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("{}: {}", err.code, err.description),
            });
        }
        if !status.is_success() {
            return Err(FetchError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("Yahoo chart endpoint returned {status}"),
            });
        }

        let chart = parsed.ok_or_else(|| FetchError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "chart response is not valid JSON".to_string(),
        })?;

        let Some(data) = chart.chart.result.and_then(|r| r.into_iter().next()) else {
            debug!(symbol, "chart response carried no result");
            return Ok(Vec::new());
        };

        let bars = rows_to_bars(symbol, data)?;
        debug!(symbol, period = %period, count = bars.len(), "chart fetched");
        Ok(bars)
    }
}

fn rows_to_bars(symbol: &str, data: ChartData) -> Result<Vec<Bar>, FetchError> {
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let cell = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(data.timestamp.len());

    for (i, &ts) in data.timestamp.iter().enumerate() {
        let open = cell(&quote.open, i);
        let high = cell(&quote.high, i);
        let low = cell(&quote.low, i);
        let close = cell(&quote.close, i);

        let Some(close) = close else {
            if open.is_none() && high.is_none() && low.is_none() {
                continue;
            }
            return Err(FetchError::MalformedBar {
                symbol: symbol.to_string(),
                index: i,
                reason: "close price missing".to_string(),
            });
        };

        let time = ts.checked_mul(1000).ok_or_else(|| FetchError::MalformedBar {
            symbol: symbol.to_string(),
            index: i,
            reason: "timestamp out of range".to_string(),
        })?;

        bars.push(Bar::new(
            time,
            open.unwrap_or(close),
            high.unwrap_or(close),
            low.unwrap_or(close),
            close,
            cell(&quote.volume, i).unwrap_or(0.0),
        ));
    }

    Ok(bars)
}

#[async_trait]
impl BarSource for YahooClient {
    async fn fetch_bars(&self, symbol: &str, period: LookbackPeriod) -> Result<Vec<Bar>, FetchError> {
        self.get_chart(symbol, period).await
    }

    fn name(&self) -> &'static str {
        "yahoo"
    }
}
