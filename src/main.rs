// =============================================================================
// Adaptive DCA — Main Entry Point
// =============================================================================
//
// Starts in Demo mode unless the config or `DCA_ACCOUNT_MODE` says `live`.
// Live mode refuses to start without API credentials.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod allocation;
mod api;
mod app_state;
mod bybit;
mod config;
mod cycle;
mod errors;
mod execution;
mod indicators;
mod ledger;
mod logging;
mod performance;
mod store;
mod types;

use std::sync::Arc;

use anyhow::{ensure, Context};
use chrono::Utc;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::bybit::BybitClient;
use crate::config::AppConfig;
use crate::ledger::AccountState;
use crate::logging::LogFormat;
use crate::store::StateStore;
use crate::types::AccountMode;

const DEFAULT_CONFIG_PATH: &str = "dca_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();
    logging::init_tracing(LogFormat::from_env());

    let config_path =
        std::env::var("DCA_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = AppConfig::load_or_init(&config_path)?;
    config.apply_env_overrides()?;
    config.validate().context("invalid configuration")?;

    info!(
        symbol = %config.symbol,
        category = %config.category,
        account_mode = %config.account_mode,
        total_capital = config.plan.total_capital,
        period_days = config.plan.allocation_period_days,
        interval_hours = config.plan.buy_interval_hours,
        total_intervals = config.plan.total_intervals(),
        "Adaptive DCA starting"
    );

    // ── 2. Exchange client ───────────────────────────────────────────────
    let api_key = std::env::var("BYBIT_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("BYBIT_API_SECRET").unwrap_or_default();
    let client = BybitClient::new(
        api_key,
        api_secret,
        config.base_url.clone(),
        config.category.clone(),
    )?;
    if config.account_mode == AccountMode::Live {
        ensure!(
            client.has_credentials(),
            "live mode requires BYBIT_API_KEY and BYBIT_API_SECRET"
        );
        warn!("LIVE mode: real orders will be placed");
    }

    // ── 3. Ledger ────────────────────────────────────────────────────────
    let store = StateStore::new(&config.state_path);
    let snapshot = store
        .load_or_init(AccountState::new(
            config.plan.total_capital,
            Utc::now().timestamp_millis(),
        ))
        .context("failed to open ledger")?;
    info!(
        version = snapshot.version,
        remaining_capital = snapshot.state.remaining_capital,
        accumulated = snapshot.state.total_accumulated,
        purchases = snapshot.state.purchase_history.len(),
        "Ledger ready"
    );

    let state = Arc::new(AppState::new(config, client, store));

    // ── 4. Status API ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", state.config.bind_addr))?;
    info!(addr = %state.config.bind_addr, "API server listening");
    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server stopped");
        }
    });

    // ── 5. Metrics loop ──────────────────────────────────────────────────
    tokio::spawn(cycle::run_metrics_loop(state.clone()));

    // ── 6. Buy loop ──────────────────────────────────────────────────────
    if snapshot.state.purchase_history.is_empty() {
        info!("No purchases yet, running first buy cycle now");
        cycle::run_buy_cycle(&state).await;
    }

    info!("Scheduler running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = cycle::run_buy_loop(state.clone()) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            warn!("Shutdown signal received, stopping");
        }
    }

    info!(cycles = state.cycles_completed(), "Adaptive DCA shut down complete.");
    Ok(())
}
