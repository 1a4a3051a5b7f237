// =============================================================================
// Allocation Scheduler — elapsed time -> baseline spend per interval
// =============================================================================
//
// The plan is divided into `allocation_period_days * 24 / buy_interval_hours`
// intervals. Each cycle spreads the remaining capital evenly over the
// intervals still ahead. Once one interval or less remains the plan is in its
// final interval and everything left is spent.
//
// `now` is always passed in; nothing here reads the clock.

use serde::Serialize;

use crate::config::PlanConfig;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Where the plan stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Schedule {
    pub elapsed_hours: f64,
    pub total_intervals: f64,
    /// Fractional number of intervals left, negative once the plan overruns.
    pub intervals_remaining: f64,
}

impl Schedule {
    /// Compute the schedule for a plan started at `start_time_ms`.
    pub fn at(start_time_ms: i64, now_ms: i64, plan: &PlanConfig) -> Self {
        let elapsed_hours = (now_ms - start_time_ms) as f64 / MS_PER_HOUR;
        let total_intervals = plan.total_intervals();
        let intervals_remaining = total_intervals - elapsed_hours / plan.buy_interval_hours;

        Self {
            elapsed_hours,
            total_intervals,
            intervals_remaining,
        }
    }

    /// One interval or less remains: spend everything that is left.
    pub fn is_final_interval(&self) -> bool {
        self.intervals_remaining <= 1.0
    }

    /// Even split of `remaining_capital` over the intervals still ahead.
    ///
    /// Only meaningful outside the final interval, where
    /// `intervals_remaining > 1`.
    pub fn base_buy_size(&self, remaining_capital: f64) -> f64 {
        remaining_capital / self.intervals_remaining
    }
}
