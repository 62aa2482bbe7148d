// =============================================================================
// Signals Module
// =============================================================================
//
// Trend-change signals derived from indicator series:
// - Golden / death cross between a fast and a slow EMA

pub mod crossover;

pub use crossover::{classify, detect, CrossSignal, CrossSnapshot, DEFAULT_MIN_HISTORY};
