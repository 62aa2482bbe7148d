// =============================================================================
// Crossover Detector: Golden / Death cross classification
// =============================================================================
//
// Compares the last two aligned points of a fast and a slow EMA series.
//
// Decision rule:
//   Golden  = prev_fast < prev_slow AND last_fast > last_slow
//   Death   = prev_fast > prev_slow AND last_fast < last_slow
//   NoCross = anything else (including equality at either point)
//
// Gates, checked in order:
//   1. history shorter than `min_history` (or < 2 points)  => NoCross
//   2. series of different lengths (misaligned)             => NoCross
//   3. any of the four values non-finite                    => NoCross
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum bars before the slow EMA is considered meaningful.
pub const DEFAULT_MIN_HISTORY: usize = 200;

/// Outcome of comparing the two most recent EMA points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossSignal {
    /// Fast EMA crossed from below to above the slow EMA.
    Golden,
    /// Fast EMA crossed from above to below the slow EMA.
    Death,
    NoCross,
}

impl std::fmt::Display for CrossSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Golden => write!(f, "Golden"),
            Self::Death => write!(f, "Death"),
            Self::NoCross => write!(f, "NoCross"),
        }
    }
}

/// The four values the decision was made on, plus the decision itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossSnapshot {
    pub prev_fast: f64,
    pub prev_slow: f64,
    pub last_fast: f64,
    pub last_slow: f64,
    pub signal: CrossSignal,
}

impl CrossSnapshot {
    /// Last fast/slow separation as a percentage of the slow EMA.
    pub fn spread_pct(&self) -> f64 {
        if self.last_slow.abs() > f64::EPSILON {
            (self.last_fast - self.last_slow) / self.last_slow * 100.0
        } else {
            0.0
        }
    }
}

/// Classify the transition between the last two points of `fast` and `slow`.
pub fn classify(fast: &[f64], slow: &[f64], min_history: usize) -> CrossSignal {
    detect(fast, slow, min_history).map_or(CrossSignal::NoCross, |s| s.signal)
}

/// Like [`classify`], but also returns the values behind the decision.
///
/// Returns `None` when one of the gates rejects the input; a snapshot is only
/// produced when the four values were actually compared.
pub fn detect(fast: &[f64], slow: &[f64], min_history: usize) -> Option<CrossSnapshot> {
    let history = fast.len();

    if history < min_history || history < 2 {
        debug!(history, min_history, "crossover: insufficient history");
        return None;
    }

    if slow.len() != history {
        debug!(fast_len = history, slow_len = slow.len(), "crossover: misaligned series");
        return None;
    }

    let (prev_fast, last_fast) = (fast[history - 2], fast[history - 1]);
    let (prev_slow, last_slow) = (slow[history - 2], slow[history - 1]);

    if ![prev_fast, prev_slow, last_fast, last_slow]
        .iter()
        .all(|v| v.is_finite())
    {
        debug!("crossover: non-finite EMA value at decision point");
        return None;
    }

    let signal = if prev_fast < prev_slow && last_fast > last_slow {
        CrossSignal::Golden
    } else if prev_fast > prev_slow && last_fast < last_slow {
        CrossSignal::Death
    } else {
        CrossSignal::NoCross
    };

    Some(CrossSnapshot {
        prev_fast,
        prev_slow,
        last_fast,
        last_slow,
        signal,
    })
}
