// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math. The scanner only needs the
// exponential moving average, computed over the full bar history.

pub mod ema;

pub use ema::{compute_emas, ema_series, EmaPair};
