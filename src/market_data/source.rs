// =============================================================================
// Bar Source: the seam between the scanner and a market-data backend
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::bar::Bar;
use crate::types::LookbackPeriod;

/// Why bars for one instrument could not be obtained.
///
/// None of these abort a scan; the scanner records them per instrument.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("malformed bar #{index} for {symbol}: {reason}")]
    MalformedBar {
        symbol: String,
        index: usize,
        reason: String,
    },

    #[error("fetch for {symbol} timed out after {after:?}")]
    Timeout { symbol: String, after: Duration },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Short machine-readable tag, used in scan reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::MalformedBar { .. } => "malformed_bar",
            Self::Timeout { .. } => "timeout",
            Self::Http(_) => "http",
        }
    }
}

/// Provider of chronologically ordered daily bars.
///
/// An unknown or delisted symbol may come back either as `Ok(vec![])` or as
/// `Err(DataUnavailable)`, depending on the backend.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch_bars(&self, symbol: &str, period: LookbackPeriod) -> Result<Vec<Bar>, FetchError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}
