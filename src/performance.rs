// =============================================================================
// Capital Metrics — periodic snapshot of plan progress
// =============================================================================

use serde::Serialize;
use tracing::info;

use crate::allocation::Schedule;
use crate::config::PlanConfig;
use crate::ledger::AccountState;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Progress of the plan valued at a given price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapitalMetrics {
    pub total_invested: f64,
    pub base_accumulated: f64,
    pub current_value: f64,
    pub unrealized_pnl: f64,
    /// `None` until something has been bought.
    pub roi_pct: Option<f64>,
    pub days_remaining: u64,
    pub cycles_remaining: u64,
}

impl CapitalMetrics {
    pub fn compute(state: &AccountState, plan: &PlanConfig, price: f64, now_ms: i64) -> Self {
        let total_invested = state.total_invested();
        let current_value = state.total_accumulated * price;
        let unrealized_pnl = current_value - total_invested;
        let roi_pct = (total_invested > 0.0).then(|| unrealized_pnl / total_invested * 100.0);

        let elapsed_hours = (now_ms - state.start_time).max(0) as f64 / MS_PER_HOUR;
        let plan_hours = plan.allocation_period_days * 24.0;
        let days_remaining = ((plan_hours - elapsed_hours) / 24.0).ceil().max(0.0) as u64;

        let schedule = Schedule::at(state.start_time, now_ms, plan);
        let cycles_remaining = schedule.intervals_remaining.ceil().max(0.0) as u64;

        Self {
            total_invested,
            base_accumulated: state.total_accumulated,
            current_value,
            unrealized_pnl,
            roi_pct,
            days_remaining,
            cycles_remaining,
        }
    }

    pub fn log(&self, symbol: &str) {
        info!(
            symbol,
            total_invested = %format!("{:.2}", self.total_invested),
            base_accumulated = %format!("{:.6}", self.base_accumulated),
            current_value = %format!("{:.2}", self.current_value),
            unrealized_pnl = %format!("{:.2}", self.unrealized_pnl),
            roi_pct = ?self.roi_pct.map(|r| format!("{r:.2}")),
            days_remaining = self.days_remaining,
            cycles_remaining = self.cycles_remaining,
            "capital metrics"
        );
    }
}
