// =============================================================================
// Scan Configuration: symbols, provider and scan parameters
// =============================================================================
//
// Loaded from a JSON file (default `scan_config.json`). All fields carry
// `#[serde(default)]` so a partial file, or `{}`, loads cleanly. A handful of
// environment variables override the file for ad-hoc runs:
//
//   SCANNER_SYMBOLS    comma-separated symbol list
//   SCANNER_PERIOD     lookback period (1y, 6mo, ...)
//   SCANNER_PROVIDER   yahoo | binance
//   SCANNER_BIND_ADDR  address for the HTTP view
//
// =============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::scanner::ScanSettings;
use crate::types::{LookbackPeriod, Provider};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "RELIANCE.NS".to_string(),
        "TCS.NS".to_string(),
        "HDFCBANK.NS".to_string(),
        "INFY.NS".to_string(),
        "ITC.NS".to_string(),
    ]
}

fn default_fast_span() -> u32 {
    50
}

fn default_slow_span() -> u32 {
    200
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_yahoo_base_url() -> String {
    crate::yahoo::client::DEFAULT_BASE_URL.to_string()
}

fn default_binance_base_url() -> String {
    crate::binance::client::DEFAULT_BASE_URL.to_string()
}

// =============================================================================
// ScanConfig
// =============================================================================

/// Top-level scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    // --- What to scan -------------------------------------------------------

    /// Instruments to scan, in the provider's symbol format.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// How much daily history to fetch per instrument.
    #[serde(default)]
    pub period: LookbackPeriod,

    /// Market-data backend.
    #[serde(default)]
    pub provider: Provider,

    // --- Signal parameters --------------------------------------------------

    #[serde(default = "default_fast_span")]
    pub fast_span: u32,

    #[serde(default = "default_slow_span")]
    pub slow_span: u32,

    /// Bars required before a crossover is reported. Defaults to `slow_span`.
    #[serde(default)]
    pub min_history: Option<usize>,

    // --- Fetching -----------------------------------------------------------

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_yahoo_base_url")]
    pub yahoo_base_url: String,

    #[serde(default = "default_binance_base_url")]
    pub binance_base_url: String,

    // --- Service mode -------------------------------------------------------

    /// Seconds between scans. `0` scans once (or only on demand when the
    /// HTTP view is enabled).
    #[serde(default)]
    pub scan_interval_secs: u64,

    /// Address for the HTTP view, e.g. `0.0.0.0:3001`. Disabled when unset.
    #[serde(default)]
    pub bind_addr: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            period: LookbackPeriod::default(),
            provider: Provider::default(),
            fast_span: default_fast_span(),
            slow_span: default_slow_span(),
            min_history: None,
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            yahoo_base_url: default_yahoo_base_url(),
            binance_base_url: default_binance_base_url(),
            scan_interval_secs: 0,
            bind_addr: None,
        }
    }
}

impl ScanConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scan config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scan config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = config.symbols.len(),
            provider = %config.provider,
            period = %config.period,
            "scan config loaded"
        );

        Ok(config)
    }

    /// Apply `SCANNER_*` overrides read through `lookup` (normally
    /// `std::env::var`). Invalid values are logged and ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(syms) = lookup("SCANNER_SYMBOLS") {
            self.symbols = syms.split(',').map(str::to_string).collect();
        }
        if let Some(period) = lookup("SCANNER_PERIOD") {
            match period.parse() {
                Ok(p) => self.period = p,
                Err(e) => warn!(error = %e, "ignoring SCANNER_PERIOD"),
            }
        }
        if let Some(provider) = lookup("SCANNER_PROVIDER") {
            match provider.parse() {
                Ok(p) => self.provider = p,
                Err(e) => warn!(error = %e, "ignoring SCANNER_PROVIDER"),
            }
        }
        if let Some(addr) = lookup("SCANNER_BIND_ADDR") {
            let addr = addr.trim().to_string();
            self.bind_addr = (!addr.is_empty()).then_some(addr);
        }
    }

    /// Trim, upper-case and de-duplicate symbols, keeping first occurrences.
    pub fn normalize_symbols(&mut self) {
        let mut seen = HashSet::new();
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();
    }

    /// Reject configurations a scan cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("no symbols configured");
        }
        if self.fast_span == 0 || self.slow_span == 0 {
            anyhow::bail!("EMA spans must be positive (fast={}, slow={})", self.fast_span, self.slow_span);
        }
        if self.fast_span >= self.slow_span {
            anyhow::bail!(
                "fast span ({}) must be shorter than slow span ({})",
                self.fast_span,
                self.slow_span
            );
        }
        if self.max_concurrent_fetches == 0 {
            anyhow::bail!("max_concurrent_fetches must be at least 1");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Effective history gate: explicit value or the slow span.
    pub fn effective_min_history(&self) -> usize {
        self.min_history.unwrap_or(self.slow_span as usize)
    }

    /// Whether the process should keep running after the first scan.
    pub fn is_service(&self) -> bool {
        self.scan_interval_secs > 0 || self.bind_addr.is_some()
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            period: self.period,
            fast_span: self.fast_span,
            slow_span: self.slow_span,
            min_history: self.effective_min_history(),
            max_concurrent_fetches: self.max_concurrent_fetches,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}
