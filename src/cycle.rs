// =============================================================================
// Cycle Scheduling — buy trigger and metrics reporting
// =============================================================================
//
// Buys fire on UTC multiples of `buy_interval_hours` (00:00 and 12:00 for the
// default 12h plan). Cycles run one after another on a single task, so two
// buy cycles never overlap within the process.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::performance::CapitalMetrics;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Time from `now_ms` until the next UTC multiple of `interval_hours`.
///
/// A `now_ms` exactly on a boundary waits a full interval.
pub fn delay_until_next_boundary(now_ms: i64, interval_hours: f64) -> Duration {
    let period_ms = ((interval_hours * MS_PER_HOUR) as i64).max(1);
    let into_period = now_ms.rem_euclid(period_ms);
    Duration::from_millis((period_ms - into_period) as u64)
}

/// Run one buy cycle now and record its outcome.
pub async fn run_buy_cycle(state: &AppState) {
    let now = Utc::now().timestamp_millis();
    match state.executor.run_cycle(now).await {
        Ok(report) => {
            info!(outcome = %report.outcome, "buy cycle complete");
            state.record_cycle(report);
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "buy cycle failed");
            state.push_error(format!("{e:#}"));
        }
    }
}

/// Sleep to each interval boundary, then buy. Never returns.
pub async fn run_buy_loop(state: Arc<AppState>) {
    let interval_hours = state.config.plan.buy_interval_hours;
    loop {
        let delay = delay_until_next_boundary(Utc::now().timestamp_millis(), interval_hours);
        info!(next_cycle_in_secs = delay.as_secs(), "waiting for next buy interval");
        tokio::time::sleep(delay).await;
        run_buy_cycle(&state).await;
    }
}

/// Log capital metrics every `metrics_interval_minutes`. Never returns.
pub async fn run_metrics_loop(state: Arc<AppState>) {
    let minutes = state.config.metrics_interval_minutes.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
    // The first tick completes immediately; startup already logs the ledger.
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = report_metrics(&state).await {
            warn!(error = %format!("{e:#}"), "capital metrics unavailable");
        }
    }
}

async fn report_metrics(state: &AppState) -> anyhow::Result<CapitalMetrics> {
    let symbol = state.config.symbol.as_str();
    let price = state.client.get_last_price(symbol).await?;
    let snapshot = state.store.load()?;
    let metrics = CapitalMetrics::compute(
        &snapshot.state,
        &state.config.plan,
        price,
        Utc::now().timestamp_millis(),
    );
    metrics.log(symbol);
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn waits_until_next_twelve_hour_mark() {
        // 03:00 UTC on the epoch day -> 9h to 12:00.
        let d = delay_until_next_boundary(3 * HOUR, 12.0);
        assert_eq!(d, Duration::from_millis((9 * HOUR) as u64));
    }

    #[test]
    fn on_boundary_waits_a_full_interval() {
        let d = delay_until_next_boundary(24 * HOUR, 12.0);
        assert_eq!(d, Duration::from_millis((12 * HOUR) as u64));
    }

    #[test]
    fn handles_fractional_intervals() {
        // 30-minute cadence, 10 minutes past the hour.
        let d = delay_until_next_boundary(HOUR + 10 * 60_000, 0.5);
        assert_eq!(d, Duration::from_millis(20 * 60_000));
    }

    #[test]
    fn boundary_is_aligned_to_utc_for_real_timestamps() {
        // 2024-01-01T05:30:00Z
        let now = 1_704_087_000_000;
        let d = delay_until_next_boundary(now, 12.0);
        let next = now + d.as_millis() as i64;
        assert_eq!(next % (12 * HOUR), 0);
        assert_eq!(d, Duration::from_millis((6 * HOUR + 30 * 60_000) as u64));
    }
}
