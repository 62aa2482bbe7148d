// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// Read-only view of the latest scan plus a rescan trigger. All endpoints live
// under `/api/v1/`.
//
// CORS is configured permissively; the API exposes no credentials or
// mutating operations beyond requesting a rescan.
// =============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::ScanState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<ScanState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/scan/latest", get(latest_scan))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/scan", post(trigger_scan))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    scans_completed: u64,
    scanning: bool,
    symbols: usize,
    uptime_secs: i64,
    server_time: i64,
}

async fn health(State(state): State<Arc<ScanState>>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        scans_completed: state.scans_completed(),
        scanning: state.is_scanning(),
        symbols: state.symbol_count,
        uptime_secs: (now - state.started_at).num_seconds(),
        server_time: now.timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Scan results
// =============================================================================

async fn latest_scan(State(state): State<Arc<ScanState>>) -> impl IntoResponse {
    match state.latest() {
        Some(result) => Json(result).into_response(),
        None => {
            let body = serde_json::json!({ "scan": null, "message": "No scan has completed yet" });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

#[derive(Serialize)]
struct SignalsResponse {
    scan_id: Option<uuid::Uuid>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    golden_crosses: BTreeSet<String>,
    death_crosses: BTreeSet<String>,
}

/// Just the two buckets, without the per-instrument bookkeeping.
async fn signals(State(state): State<Arc<ScanState>>) -> impl IntoResponse {
    let resp = match state.latest() {
        Some(r) => SignalsResponse {
            scan_id: Some(r.scan_id),
            finished_at: Some(r.finished_at),
            golden_crosses: r.golden_crosses,
            death_crosses: r.death_crosses,
        },
        None => SignalsResponse {
            scan_id: None,
            finished_at: None,
            golden_crosses: BTreeSet::new(),
            death_crosses: BTreeSet::new(),
        },
    };
    Json(resp)
}

// =============================================================================
// Control
// =============================================================================

async fn trigger_scan(State(state): State<Arc<ScanState>>) -> impl IntoResponse {
    state.request_scan();
    info!(already_scanning = state.is_scanning(), "rescan requested via API");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "queued": true, "scanning": state.is_scanning() })),
    )
}
