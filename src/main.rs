// =============================================================================
// Pulse Chart — Main Entry Point
// =============================================================================
//
// Runs one chart session against Binance's public REST API and serves its
// series, market snapshot and indicator summary over HTTP/WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod chart_frame;
mod indicators;
mod market_data;
mod reconcile;
mod runtime_config;
mod session;
mod types;
mod view;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::market_data::MarketDataClient;
use crate::runtime_config::RuntimeConfig;
use crate::session::{SessionHandle, SessionSettings};
use crate::types::ChartKey;

const CONFIG_PATH: &str = "pulse_config.json";

/// Session updates buffered between the session task and the view consumer.
const UPDATE_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Pulse Chart — Starting Up                         ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides()?;

    let key = ChartKey::new(&config.default_symbol, config.default_interval)
        .context("default_symbol is not a valid trading pair")?;
    if !config.is_known_symbol(&key.symbol) {
        warn!(symbol = %key.symbol, "default symbol is not in the selectable list");
    }

    info!(
        symbols = ?config.symbols,
        key = %key,
        tick_delay_ms = config.tick_delay_ms,
        "Configured chart session"
    );

    // ── 2. Build market data client ──────────────────────────────────────
    let binance = BinanceClient::new(config.api_base_url.clone(), config.request_timeout())?;
    info!(base_url = binance.base_url(), "Binance client ready");
    let market_data = Arc::new(MarketDataClient::new(binance));

    let settings = SessionSettings::from(&config);
    let bind_addr = config.bind_addr.clone();

    // ── 3. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, CONFIG_PATH));

    // ── 4. Start the chart session and its consumer ──────────────────────
    let (update_tx, mut update_rx) = mpsc::channel(UPDATE_BUFFER);
    let session = SessionHandle::spawn(market_data, key, settings, update_tx);
    state.attach_session(session.control());

    let view_state = state.clone();
    let consumer = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            view_state.apply_update(update);
        }
        info!("Session update stream ended");
    });

    // ── 5. Start the API server ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("Chart feed running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");
    info!(session = %session.id(), "Stopping chart session");

    session.shutdown().await;
    if let Err(e) = consumer.await {
        warn!(error = %e, "Update consumer ended abnormally");
    }

    let config = state.runtime_config.read().clone();
    if let Err(e) = config.save(&state.config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Pulse Chart shut down complete.");
    Ok(())
}
