// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha  = 2 / (span + 1)
//   EMA_0  = close_0
//   EMA_t  = alpha * close_t + (1 - alpha) * EMA_{t-1}
//
// The series is seeded with the first close, so every input bar has an EMA
// value and the output is index-aligned with the input. Warm-up is handled by
// the crossover detector's history gate, not by leaving a gap here.
// =============================================================================

use crate::market_data::Bar;

/// Fast and slow EMA series, both index-aligned with the bars they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmaPair {
    pub fast: Vec<f64>,
    pub slow: Vec<f64>,
}

impl EmaPair {
    /// Number of points in each series.
    pub fn len(&self) -> usize {
        self.fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty()
    }
}

/// Smoothing factor for `span`. A span of zero is treated as one.
pub fn smoothing_factor(span: u32) -> f64 {
    2.0 / (span.max(1) as f64 + 1.0)
}

/// Compute the EMA series for `closes` with the given `span`.
///
/// The output always has `closes.len()` elements; an empty input yields an
/// empty vec. Non-finite closes propagate through the recurrence, which the
/// crossover detector rejects at the decision point.
pub fn ema_series(closes: &[f64], span: u32) -> Vec<f64> {
    let alpha = smoothing_factor(span);

    let mut result = Vec::with_capacity(closes.len());
    let mut iter = closes.iter().copied();

    let Some(seed) = iter.next() else {
        return result;
    };
    result.push(seed);

    let mut prev = seed;
    for close in iter {
        let ema = alpha * close + (1.0 - alpha) * prev;
        result.push(ema);
        prev = ema;
    }

    result
}

/// Compute the fast and slow EMA of the bars' closing prices.
pub fn compute_emas(bars: &[Bar], fast_span: u32, slow_span: u32) -> EmaPair {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    EmaPair {
        fast: ema_series(&closes, fast_span),
        slow: ema_series(&closes, slow_span),
    }
}
