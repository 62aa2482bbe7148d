use serde::{Deserialize, Serialize};

use super::source::FetchError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single daily OHLCV bar. Only `close` feeds the crossover scan; the other
/// fields are carried for logging and the HTTP view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time, UNIX milliseconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A bar where every price equals `close`. Handy for synthetic series.
    pub fn from_close(time: i64, close: f64) -> Self {
        Self::new(time, close, close, close, close, 0.0)
    }
}

/// Check that `bars` can be fed to the EMA engine as-is: every close is
/// finite and bar times never go backwards.
///
/// Bars are never reordered; an out-of-order series is rejected instead.
pub fn validate_bars(symbol: &str, bars: &[Bar]) -> Result<(), FetchError> {
    let mut prev_time = i64::MIN;

    for (index, bar) in bars.iter().enumerate() {
        if !bar.close.is_finite() {
            return Err(FetchError::MalformedBar {
                symbol: symbol.to_string(),
                index,
                reason: format!("non-finite close {}", bar.close),
            });
        }
        if bar.time < prev_time {
            return Err(FetchError::MalformedBar {
                symbol: symbol.to_string(),
                index,
                reason: format!("bar time {} precedes previous bar {}", bar.time, prev_time),
            });
        }
        prev_time = bar.time;
    }

    Ok(())
}
