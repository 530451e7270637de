// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The chart feed is public market data,
// so no endpoint requires authentication.
//
// CORS is configured permissively so a browser-hosted chart on any origin
// can read the feed.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::types::Interval;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/symbols", get(symbols))
        .route("/api/v1/session", post(switch_session))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full chart state
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Selectable symbols / intervals
// =============================================================================

#[derive(Serialize)]
struct SymbolsResponse {
    symbols: Vec<String>,
    intervals: Vec<&'static str>,
    default_symbol: String,
    default_interval: Interval,
}

async fn symbols(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.runtime_config.read();
    Json(SymbolsResponse {
        symbols: config.symbols.clone(),
        intervals: Interval::ALL.iter().map(Interval::as_str).collect(),
        default_symbol: config.default_symbol.clone(),
        default_interval: config.default_interval,
    })
}

// =============================================================================
// Session switch
// =============================================================================

#[derive(Deserialize)]
struct SessionRequest {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    interval: Option<String>,
}

#[derive(Serialize)]
struct SessionResponse {
    symbol: String,
    interval: Interval,
}

async fn switch_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let interval = req
        .interval
        .as_deref()
        .map(str::parse::<Interval>)
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let key = state
        .resolve_key(req.symbol.as_deref(), interval)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    if let Err(e) = state.switch_session(key.clone()).await {
        warn!(key = %key, error = %e, "session switch failed");
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e));
    }

    info!(key = %key, "session switched via API");
    Ok(Json(SessionResponse {
        symbol: key.symbol,
        interval: key.interval,
    }))
}
