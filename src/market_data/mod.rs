pub mod bar;
pub mod source;

// Re-export for convenient access (e.g. `use crate::market_data::Bar`).
pub use bar::{validate_bars, Bar};
pub use source::{BarSource, FetchError};
