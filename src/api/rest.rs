// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only status surface under `/api/v1/`. Nothing here can trigger a buy
// or modify the ledger.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::allocation::Schedule;
use crate::app_state::AppState;
use crate::ledger::AccountState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the status router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(ledger_state))
        .route("/api/v1/decision", get(last_decision))
        .route("/api/v1/errors", get(recent_errors))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    symbol: String,
    account_mode: String,
    cycles_completed: u64,
    last_cycle_at: Option<i64>,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_cycle_at = state.last_report.read().as_ref().map(|r| r.at);
    Json(HealthResponse {
        status: "ok",
        symbol: state.config.symbol.clone(),
        account_mode: state.config.account_mode.to_string(),
        cycles_completed: state.cycles_completed(),
        last_cycle_at,
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Ledger snapshot
// =============================================================================

#[derive(Serialize)]
struct StateResponse {
    version: u64,
    average_cost: Option<f64>,
    schedule: Schedule,
    state: AccountState,
}

async fn ledger_state(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let snapshot = state.store.load().map_err(|e| {
        warn!(error = %e, "ledger unavailable for status API");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": format!("ledger unavailable: {e}") })),
        )
    })?;

    let schedule = Schedule::at(
        snapshot.state.start_time,
        chrono::Utc::now().timestamp_millis(),
        &state.config.plan,
    );

    Ok(Json(StateResponse {
        version: snapshot.version,
        average_cost: snapshot.state.average_cost(),
        schedule,
        state: snapshot.state,
    }))
}

// =============================================================================
// Last decision
// =============================================================================

async fn last_decision(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    match state.last_report.read().clone() {
        Some(report) => Ok(Json(report)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no buy cycle has run yet" })),
        )),
    }
}

// =============================================================================
// Errors
// =============================================================================

async fn recent_errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.recent_errors.read().clone())
}
