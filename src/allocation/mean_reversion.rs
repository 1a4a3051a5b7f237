// =============================================================================
// Mean-Reversion Adjuster
// =============================================================================
//
// Buys more when price trades below the running cost basis and less when it
// trades above, scaling with the square root of the relative deviation:
//
//   below basis:  min(1 + sqrt(|dev|) * sensitivity, max_buy_percent)
//   otherwise:    max(1 - sqrt(dev) * sensitivity / max_buy_percent, min_buy_percent)
// =============================================================================

use crate::config::PlanConfig;

/// Cost basis used for the deviation: the volume-weighted average entry, or
/// the current price itself before anything has been accumulated.
pub fn cost_basis(price: f64, weighted_sum_cost: f64, total_accumulated: f64) -> f64 {
    if total_accumulated > 0.0 {
        weighted_sum_cost / total_accumulated
    } else {
        price
    }
}

/// Deviation-based buy factor for `price` against `basis`.
pub fn mean_reversion_factor(price: f64, basis: f64, plan: &PlanConfig) -> f64 {
    let deviation = (price - basis) / basis;

    if price < basis {
        let boost = 1.0 + deviation.abs().sqrt() * plan.sensitivity;
        boost.min(plan.max_buy_percent)
    } else {
        // deviation >= 0 here for a positive basis; the max() keeps the
        // radicand valid for anything else.
        let damp = 1.0 - deviation.max(0.0).sqrt() * (plan.sensitivity / plan.max_buy_percent);
        damp.max(plan.min_buy_percent)
    }
}
