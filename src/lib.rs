// =============================================================================
// EMA Cross Scanner: library root
// =============================================================================
//
// Golden / death cross detection over daily bars:
//   indicators  EMA engine
//   signals     crossover detector
//   scanner     per-instrument orchestration and aggregation
//   yahoo, binance  market-data adapters behind `market_data::BarSource`
// =============================================================================

pub mod api;
pub mod app_state;
pub mod binance;
pub mod indicators;
pub mod market_data;
pub mod scan_config;
pub mod scanner;
pub mod signals;
pub mod types;
pub mod yahoo;
