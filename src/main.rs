// =============================================================================
// EMA Cross Scanner: Main Entry Point
// =============================================================================
//
// Scans the configured instruments for golden / death crosses of the 50- and
// 200-period EMAs of daily closes.
//
// One-shot mode (default): scan once, print both lists, exit.
// Service mode (`scan_interval_secs > 0` or `bind_addr` set): rescan on a
// timer or on demand and serve the latest result over HTTP.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ema_cross_scanner::app_state::ScanState;
use ema_cross_scanner::market_data::BarSource;
use ema_cross_scanner::scan_config::ScanConfig;
use ema_cross_scanner::scanner::{ScanResult, Scanner};
use ema_cross_scanner::types::Provider;
use ema_cross_scanner::{api, binance, yahoo};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("SCANNER_CONFIG").unwrap_or_else(|_| "scan_config.json".into());

    let mut config = ScanConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ScanConfig::default()
    });
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.normalize_symbols();
    config.validate().context("invalid scan configuration")?;

    info!(
        symbols = config.symbols.len(),
        provider = %config.provider,
        period = %config.period,
        fast_span = config.fast_span,
        slow_span = config.slow_span,
        min_history = config.effective_min_history(),
        "EMA cross scanner starting"
    );

    // ── 2. Data source & scanner ─────────────────────────────────────────
    let source = build_source(&config)?;
    let scanner = Scanner::new(source, config.scan_settings());

    if !config.is_service() {
        let result = scanner.scan(&config.symbols).await;
        print_result(&result);
        return Ok(());
    }

    // ── 3. Service mode: shared state + API server ───────────────────────
    let state = Arc::new(ScanState::new(config.symbols.len()));

    if let Some(bind_addr) = config.bind_addr.clone() {
        let api_state = state.clone();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
        info!(addr = %bind_addr, "API server listening");

        tokio::spawn(async move {
            let app = api::rest::router(api_state);
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "API server failed");
            }
        });
    }

    // ── 4. Scan loop ─────────────────────────────────────────────────────
    let loop_state = state.clone();
    let symbols = config.symbols.clone();
    let interval = (config.scan_interval_secs > 0).then(|| Duration::from_secs(config.scan_interval_secs));

    tokio::spawn(async move {
        loop {
            loop_state.mark_scanning();
            let result = scanner.scan(&symbols).await;
            print_result(&result);
            loop_state.publish(result);

            match interval {
                Some(every) => {
                    tokio::select! {
                        _ = tokio::time::sleep(every) => {}
                        _ = loop_state.scan_requested() => info!("rescan triggered"),
                    }
                }
                None => {
                    loop_state.scan_requested().await;
                    info!("rescan triggered");
                }
            }
        }
    });

    info!(
        interval_secs = config.scan_interval_secs,
        concurrency = config.max_concurrent_fetches,
        "Scanner running. Press Ctrl+C to stop."
    );

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");
    info!(scans = state.scans_completed(), "EMA cross scanner shut down.");
    Ok(())
}

fn build_source(config: &ScanConfig) -> anyhow::Result<Arc<dyn BarSource>> {
    let source: Arc<dyn BarSource> = match config.provider {
        Provider::Yahoo => Arc::new(yahoo::YahooClient::new(&config.yahoo_base_url)?),
        Provider::Binance => Arc::new(binance::BinanceClient::new(config.binance_base_url.as_str())?),
    };
    info!(source = source.name(), "market data source ready");
    Ok(source)
}

fn print_result(result: &ScanResult) {
    let golden: Vec<&str> = result.golden_crosses.iter().map(String::as_str).collect();
    let death: Vec<&str> = result.death_crosses.iter().map(String::as_str).collect();

    println!("Golden Cross: {golden:?}");
    println!("Death Cross:  {death:?}");

    if !result.failed.is_empty() || !result.skipped.is_empty() {
        info!(
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "some instruments could not be evaluated (run with RUST_LOG=debug for details)"
        );
    }
}
