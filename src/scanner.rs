// =============================================================================
// Scan Orchestrator: per-instrument evaluation and result aggregation
// =============================================================================
//
// Pipeline, per instrument:
//   1. Fetch daily bars for the lookback period (bounded by a timeout)
//   2. Validate bar order and closes
//   3. Compute fast / slow EMA over the closes
//   4. Classify the last two points (golden / death / no cross)
//   5. Bucket the symbol in the scan result
//
// Instruments run on a bounded pool (`buffered`), so at most
// `max_concurrent_fetches` fetches are in flight. A failure in one instrument
// is captured as an `InstrumentOutcome` and never aborts the scan.
// =============================================================================

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::indicators::ema::compute_emas;
use crate::market_data::{validate_bars, Bar, BarSource, FetchError};
use crate::signals::crossover::{detect, CrossSignal, CrossSnapshot, DEFAULT_MIN_HISTORY};
use crate::types::LookbackPeriod;

// =============================================================================
// Settings
// =============================================================================

/// Parameters of a single scan.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub period: LookbackPeriod,
    pub fast_span: u32,
    pub slow_span: u32,
    /// Bars required before a crossover is reported. Not derived when the
    /// struct is built by hand; [`ScanSettings::with_spans`] ties it to
    /// `slow_span`.
    pub min_history: usize,
    /// Upper bound on concurrent fetches. `1` scans strictly sequentially.
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            period: LookbackPeriod::Year1,
            fast_span: 50,
            slow_span: 200,
            min_history: DEFAULT_MIN_HISTORY,
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

impl ScanSettings {
    /// Default settings with custom spans, gating on `slow_span` bars of
    /// history.
    pub fn with_spans(fast_span: u32, slow_span: u32) -> Self {
        Self {
            fast_span,
            slow_span,
            min_history: slow_span as usize,
            ..Self::default()
        }
    }
}

// =============================================================================
// Per-instrument outcome
// =============================================================================

/// What happened to one instrument during a scan.
#[derive(Debug)]
pub enum InstrumentOutcome {
    /// Bars were fetched and classified. `snapshot` is absent when the
    /// history gate rejected the series.
    Evaluated {
        signal: CrossSignal,
        bars: usize,
        snapshot: Option<CrossSnapshot>,
    },
    /// The source returned no bars.
    Skipped { reason: String },
    /// Fetching or validating the bars failed.
    Failed { error: FetchError },
}

/// An instrument that could not be evaluated, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedInstrument {
    pub symbol: String,
    pub kind: String,
    pub reason: String,
}

// =============================================================================
// Scan result
// =============================================================================

/// Aggregated result of scanning a list of instruments.
///
/// A symbol appears in at most one of `golden_crosses` / `death_crosses`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub source: String,
    pub period: LookbackPeriod,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub golden_crosses: BTreeSet<String>,
    pub death_crosses: BTreeSet<String>,
    /// Distinct symbols scanned.
    pub requested: usize,
    /// Symbols whose bars were classified, crossing or not.
    pub evaluated: usize,
    pub skipped: Vec<SkippedInstrument>,
    pub failed: Vec<SkippedInstrument>,
}

impl ScanResult {
    fn empty(source: &str, period: LookbackPeriod, started_at: DateTime<Utc>) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            source: source.to_string(),
            period,
            started_at,
            finished_at: started_at,
            golden_crosses: BTreeSet::new(),
            death_crosses: BTreeSet::new(),
            requested: 0,
            evaluated: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// The signal recorded for `symbol` in this scan.
    pub fn signal_for(&self, symbol: &str) -> CrossSignal {
        if self.golden_crosses.contains(symbol) {
            CrossSignal::Golden
        } else if self.death_crosses.contains(symbol) {
            CrossSignal::Death
        } else {
            CrossSignal::NoCross
        }
    }

    fn record(&mut self, symbol: String, outcome: InstrumentOutcome) {
        match outcome {
            InstrumentOutcome::Evaluated { signal, .. } => {
                self.evaluated += 1;
                match signal {
                    CrossSignal::Golden => {
                        self.golden_crosses.insert(symbol);
                    }
                    CrossSignal::Death => {
                        self.death_crosses.insert(symbol);
                    }
                    CrossSignal::NoCross => {}
                }
            }
            InstrumentOutcome::Skipped { reason } => self.skipped.push(SkippedInstrument {
                symbol,
                kind: "empty".to_string(),
                reason,
            }),
            InstrumentOutcome::Failed { error } => self.failed.push(SkippedInstrument {
                symbol,
                kind: error.kind().to_string(),
                reason: error.to_string(),
            }),
        }
    }
}

// =============================================================================
// Pure evaluation
// =============================================================================

/// Run the EMA engine and the crossover detector over `bars`.
pub fn evaluate_bars(bars: &[Bar], settings: &ScanSettings) -> (CrossSignal, Option<CrossSnapshot>) {
    let emas = compute_emas(bars, settings.fast_span, settings.slow_span);
    let snapshot = detect(&emas.fast, &emas.slow, settings.min_history);
    let signal = snapshot.map_or(CrossSignal::NoCross, |s| s.signal);
    (signal, snapshot)
}

// =============================================================================
// Scanner
// =============================================================================

pub struct Scanner {
    source: Arc<dyn BarSource>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(source: Arc<dyn BarSource>, settings: ScanSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Fetch and classify a single instrument. Never panics on bad data and
    /// never returns an error: every failure is folded into the outcome.
    pub async fn evaluate_instrument(&self, symbol: &str) -> InstrumentOutcome {
        let timeout = self.settings.fetch_timeout;
        let fetched = tokio::time::timeout(timeout, self.source.fetch_bars(symbol, self.settings.period)).await;

        let bars = match fetched {
            Ok(Ok(bars)) => bars,
            Ok(Err(error)) => return InstrumentOutcome::Failed { error },
            Err(_) => {
                return InstrumentOutcome::Failed {
                    error: FetchError::Timeout {
                        symbol: symbol.to_string(),
                        after: timeout,
                    },
                }
            }
        };

        if bars.is_empty() {
            return InstrumentOutcome::Skipped {
                reason: format!("{} returned no bars", self.source.name()),
            };
        }

        if let Err(error) = validate_bars(symbol, &bars) {
            return InstrumentOutcome::Failed { error };
        }

        let (signal, snapshot) = evaluate_bars(&bars, &self.settings);
        InstrumentOutcome::Evaluated {
            signal,
            bars: bars.len(),
            snapshot,
        }
    }

    /// Scan `symbols` and bucket every golden and death cross.
    ///
    /// Duplicate symbols are evaluated once. The scan always completes.
    pub async fn scan(&self, symbols: &[String]) -> ScanResult {
        let started_at = Utc::now();
        let mut result = ScanResult::empty(self.source.name(), self.settings.period, started_at);

        let mut seen = HashSet::new();
        let unique: Vec<&String> = symbols.iter().filter(|s| seen.insert(s.as_str())).collect();
        result.requested = unique.len();

        info!(
            scan_id = %result.scan_id,
            source = self.source.name(),
            period = %self.settings.period,
            symbols = unique.len(),
            concurrency = self.settings.max_concurrent_fetches,
            "scan started"
        );

        let outcomes: Vec<(String, InstrumentOutcome)> = stream::iter(unique.into_iter().cloned())
            .map(|symbol: String| async move {
                let outcome = self.evaluate_instrument(&symbol).await;
                (symbol, outcome)
            })
            .buffered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await;

        for (symbol, outcome) in outcomes {
            log_outcome(&symbol, &outcome);
            result.record(symbol, outcome);
        }

        result.finished_at = Utc::now();

        info!(
            scan_id = %result.scan_id,
            golden = result.golden_crosses.len(),
            death = result.death_crosses.len(),
            evaluated = result.evaluated,
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            elapsed_ms = (result.finished_at - result.started_at).num_milliseconds(),
            "scan complete"
        );

        result
    }
}

fn log_outcome(symbol: &str, outcome: &InstrumentOutcome) {
    match outcome {
        InstrumentOutcome::Evaluated {
            signal,
            bars,
            snapshot,
        } => match (signal, snapshot) {
            (CrossSignal::Golden | CrossSignal::Death, Some(snap)) => info!(
                symbol,
                signal = %signal,
                bars,
                fast = format!("{:.4}", snap.last_fast),
                slow = format!("{:.4}", snap.last_slow),
                spread_pct = format!("{:.3}", snap.spread_pct()),
                "crossover detected"
            ),
            _ => debug!(symbol, bars, gated = snapshot.is_none(), "no crossover"),
        },
        InstrumentOutcome::Skipped { reason } => debug!(symbol, reason = %reason, "instrument skipped"),
        InstrumentOutcome::Failed { error } => warn!(symbol, error = %error, "instrument failed"),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::indicators::ema::ema_series;

    enum Canned {
        Bars(Vec<Bar>),
        Unavailable,
        Stall,
    }

    /// In-memory source keyed by symbol. Unknown symbols return no bars.
    struct CannedSource {
        data: HashMap<String, Canned>,
        calls: AtomicUsize,
    }

    impl CannedSource {
        fn new(entries: Vec<(&str, Canned)>) -> Self {
            Self {
                data: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BarSource for CannedSource {
        async fn fetch_bars(&self, symbol: &str, _period: LookbackPeriod) -> Result<Vec<Bar>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.data.get(symbol) {
                Some(Canned::Bars(bars)) => Ok(bars.clone()),
                Some(Canned::Unavailable) => Err(FetchError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: "no such ticker".to_string(),
                }),
                Some(Canned::Stall) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Vec::new())
                }
                None => Ok(Vec::new()),
            }
        }

        fn name(&self) -> &'static str {
            "canned"
        }
    }

    fn to_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::from_close(i as i64 * 86_400_000, c))
            .collect()
    }

    /// `n` closes: flat, then a gentle drift that keeps the fast EMA on one
    /// side of the slow EMA, then a final close just past the level that
    /// flips the fast EMA to the other side on the very last bar.
    fn crossing_closes(n: usize, upward: bool) -> Vec<f64> {
        let drift = if upward { -0.02 } else { 0.02 };
        let mut closes: Vec<f64> = (0..n - 1)
            .map(|i| if i < 150 { 100.0 } else { 100.0 + drift * (i - 150) as f64 })
            .collect();

        let fast = *ema_series(&closes, 50).last().unwrap();
        let slow = *ema_series(&closes, 200).last().unwrap();
        let (af, asl) = (2.0 / 51.0, 2.0 / 201.0);
        let flip = ((1.0 - asl) * slow - (1.0 - af) * fast) / (af - asl);

        closes.push(if upward { flip + 1.0 } else { flip - 1.0 });
        closes
    }

    /// Deterministic wandering series for property-style checks.
    fn wandering_closes(seed: u64, n: usize) -> Vec<f64> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut price = 100.0;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let step = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
                price = (price + step * 4.0).max(1.0);
                price
            })
            .collect()
    }

    fn scanner(source: CannedSource, settings: ScanSettings) -> Scanner {
        Scanner::new(Arc::new(source), settings)
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn constructed_series_cross_exactly_at_last_bar() {
        let closes = crossing_closes(250, true);
        let fast = ema_series(&closes, 50);
        let slow = ema_series(&closes, 200);
        assert!(fast[248] < slow[248]);
        assert!(fast[249] > slow[249]);
        assert!(closes.iter().all(|c| *c > 0.0));

        let closes = crossing_closes(250, false);
        let fast = ema_series(&closes, 50);
        let slow = ema_series(&closes, 200);
        assert!(fast[248] > slow[248]);
        assert!(fast[249] < slow[249]);
        assert!(closes.iter().all(|c| *c > 0.0));
    }

    #[tokio::test]
    async fn golden_cross_lands_in_golden_bucket_only() {
        let source = CannedSource::new(vec![("GOLD.NS", Canned::Bars(to_bars(&crossing_closes(250, true))))]);
        let result = scanner(source, ScanSettings::default()).scan(&symbols(&["GOLD.NS"])).await;

        assert!(result.golden_crosses.contains("GOLD.NS"));
        assert!(!result.death_crosses.contains("GOLD.NS"));
        assert_eq!(result.signal_for("GOLD.NS"), CrossSignal::Golden);
        assert_eq!(result.evaluated, 1);
    }

    #[tokio::test]
    async fn death_cross_lands_in_death_bucket_only() {
        let source = CannedSource::new(vec![("DOOM.NS", Canned::Bars(to_bars(&crossing_closes(250, false))))]);
        let result = scanner(source, ScanSettings::default()).scan(&symbols(&["DOOM.NS"])).await;

        assert!(result.death_crosses.contains("DOOM.NS"));
        assert!(result.golden_crosses.is_empty());
    }

    #[tokio::test]
    async fn short_history_is_never_reported() {
        let source = CannedSource::new(vec![("NEW.NS", Canned::Bars(to_bars(&crossing_closes(199, true))))]);
        let scanner = scanner(source, ScanSettings::default());

        match scanner.evaluate_instrument("NEW.NS").await {
            InstrumentOutcome::Evaluated { signal, bars, snapshot } => {
                assert_eq!(signal, CrossSignal::NoCross);
                assert_eq!(bars, 199);
                assert!(snapshot.is_none());
            }
            other => panic!("expected Evaluated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_fetch_is_skipped_and_scan_completes() {
        let source = CannedSource::new(vec![
            ("EMPTY.NS", Canned::Bars(Vec::new())),
            ("GOLD.NS", Canned::Bars(to_bars(&crossing_closes(250, true)))),
        ]);
        let result = scanner(source, ScanSettings::default())
            .scan(&symbols(&["EMPTY.NS", "GOLD.NS"]))
            .await;

        assert!(!result.golden_crosses.contains("EMPTY.NS"));
        assert!(!result.death_crosses.contains("EMPTY.NS"));
        assert!(result.golden_crosses.contains("GOLD.NS"));
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].symbol, "EMPTY.NS");
        assert_eq!(result.requested, 2);
    }

    #[tokio::test]
    async fn fetch_errors_and_bad_bars_are_isolated() {
        let mut bad = to_bars(&crossing_closes(250, true));
        bad[10].close = f64::NAN;
        let source = CannedSource::new(vec![
            ("GONE.NS", Canned::Unavailable),
            ("BAD.NS", Canned::Bars(bad)),
            ("DOOM.NS", Canned::Bars(to_bars(&crossing_closes(250, false)))),
        ]);
        let result = scanner(source, ScanSettings::default())
            .scan(&symbols(&["GONE.NS", "BAD.NS", "DOOM.NS"]))
            .await;

        assert_eq!(result.death_crosses.len(), 1);
        assert_eq!(result.failed.len(), 2);
        let kinds: Vec<&str> = result.failed.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["data_unavailable", "malformed_bar"]);
        assert_eq!(result.signal_for("BAD.NS"), CrossSignal::NoCross);
    }

    #[tokio::test]
    async fn stalled_fetch_times_out() {
        let source = CannedSource::new(vec![
            ("SLOW.NS", Canned::Stall),
            ("GOLD.NS", Canned::Bars(to_bars(&crossing_closes(250, true)))),
        ]);
        let settings = ScanSettings {
            fetch_timeout: Duration::from_millis(50),
            ..ScanSettings::default()
        };
        let result = scanner(source, settings).scan(&symbols(&["SLOW.NS", "GOLD.NS"])).await;

        assert!(result.golden_crosses.contains("GOLD.NS"));
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].kind, "timeout");
    }

    #[tokio::test]
    async fn duplicate_symbols_are_fetched_once() {
        let source = Arc::new(CannedSource::new(vec![(
            "GOLD.NS",
            Canned::Bars(to_bars(&crossing_closes(250, true))),
        )]));
        let scanner = Scanner::new(source.clone(), ScanSettings::default());
        let result = scanner.scan(&symbols(&["GOLD.NS", "GOLD.NS", "GOLD.NS"])).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.requested, 1);
        assert_eq!(result.golden_crosses.len(), 1);
    }

    fn mixed_universe(names: &[String]) -> CannedSource {
        let entries = names
            .iter()
            .enumerate()
            .map(|(seed, name)| {
                let closes = match seed % 5 {
                    0 => crossing_closes(230 + seed, true),
                    1 => crossing_closes(230 + seed, false),
                    _ => wandering_closes(seed as u64, 180 + seed * 3),
                };
                (name.as_str(), Canned::Bars(to_bars(&closes)))
            })
            .collect();
        CannedSource::new(entries)
    }

    #[tokio::test]
    async fn buckets_are_exclusive_and_independent_of_concurrency() {
        let names: Vec<String> = (0..40).map(|i| format!("SYM{i}")).collect();

        let sequential = ScanSettings {
            max_concurrent_fetches: 1,
            ..ScanSettings::default()
        };
        let parallel = ScanSettings {
            max_concurrent_fetches: 8,
            ..ScanSettings::default()
        };

        let seq = scanner(mixed_universe(&names), sequential).scan(&names).await;
        let par = scanner(mixed_universe(&names), parallel).scan(&names).await;

        assert_eq!(seq.golden_crosses, par.golden_crosses);
        assert_eq!(seq.death_crosses, par.death_crosses);
        assert!(seq.golden_crosses.len() >= 8);
        assert!(seq.death_crosses.len() >= 8);
        assert!(seq.golden_crosses.is_disjoint(&seq.death_crosses));
        assert_eq!(seq.evaluated, 40);
    }

    #[test]
    fn evaluate_bars_respects_custom_min_history() {
        let bars = to_bars(&crossing_closes(250, true));
        let strict = ScanSettings {
            min_history: 251,
            ..ScanSettings::default()
        };
        assert_eq!(evaluate_bars(&bars, &strict).0, CrossSignal::NoCross);
        assert_eq!(evaluate_bars(&bars, &ScanSettings::default()).0, CrossSignal::Golden);
    }

    #[test]
    fn with_spans_gates_on_slow_span() {
        let settings = ScanSettings::with_spans(20, 150);
        assert_eq!(settings.fast_span, 20);
        assert_eq!(settings.slow_span, 150);
        assert_eq!(settings.min_history, 150);
        assert_eq!(settings.max_concurrent_fetches, ScanSettings::default().max_concurrent_fetches);

        let bars = to_bars(&crossing_closes(250, true));
        assert!(evaluate_bars(&bars[..149], &settings).1.is_none());
        assert!(evaluate_bars(&bars[..160], &settings).1.is_some());
        assert!(evaluate_bars(&bars[..160], &ScanSettings::default()).1.is_none());
    }
}
