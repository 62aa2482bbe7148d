// =============================================================================
// Shared Scan State: service mode
// =============================================================================
//
// Holds the most recent scan result for the HTTP view and the trigger the
// API uses to request an immediate rescan.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for the published result.
//   - tokio Notify for the rescan trigger (a trigger sent while a scan is
//     running is kept and starts the next scan right after).
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::scanner::ScanResult;

pub struct ScanState {
    /// Monotonically increasing version, bumped on every published scan.
    state_version: AtomicU64,
    scans_completed: AtomicU64,
    scanning: AtomicBool,
    latest: RwLock<Option<ScanResult>>,
    trigger: Notify,
    pub started_at: DateTime<Utc>,
    /// Number of symbols each scan covers, for the health payload.
    pub symbol_count: usize,
}

impl ScanState {
    pub fn new(symbol_count: usize) -> Self {
        Self {
            state_version: AtomicU64::new(0),
            scans_completed: AtomicU64::new(0),
            scanning: AtomicBool::new(false),
            latest: RwLock::new(None),
            trigger: Notify::new(),
            started_at: Utc::now(),
            symbol_count,
        }
    }

    // ── Version tracking ────────────────────────────────────────────────

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::Acquire)
    }

    pub fn scans_completed(&self) -> u64 {
        self.scans_completed.load(Ordering::Acquire)
    }

    // ── Scan lifecycle ──────────────────────────────────────────────────

    pub fn mark_scanning(&self) {
        self.scanning.store(true, Ordering::Release);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Replace the latest result and bump the version.
    pub fn publish(&self, result: ScanResult) {
        *self.latest.write() = Some(result);
        self.scans_completed.fetch_add(1, Ordering::AcqRel);
        self.state_version.fetch_add(1, Ordering::AcqRel);
        self.scanning.store(false, Ordering::Release);
    }

    pub fn latest(&self) -> Option<ScanResult> {
        self.latest.read().clone()
    }

    // ── Trigger ─────────────────────────────────────────────────────────

    /// Ask the scan loop to run as soon as it is idle.
    pub fn request_scan(&self) {
        self.trigger.notify_one();
    }

    /// Resolves once a scan has been requested.
    pub async fn scan_requested(&self) {
        self.trigger.notified().await;
    }
}
