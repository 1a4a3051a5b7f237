// =============================================================================
// Safety Clamp — capital preservation and circuit breaker
// =============================================================================
//
// The indicator-adjusted buy size is cut down by three bounds:
//
//   1. Capital preservation — keep enough back to fund every future interval
//                             at the minimum rate:
//                               remaining - base * (intervals - 1) * min_pct
//   2. Remaining capital    — never spend more than is left.
//   3. Circuit breaker      — never spend more than a fixed fraction of what
//                             is left in a single cycle.
//
// The smallest candidate wins. A negative capital-preservation bound (the
// reserve already exceeds what is left) floors the spend at zero.
// =============================================================================

use serde::Serialize;

use crate::config::PlanConfig;

/// Which bound produced the final spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindingLimit {
    /// The indicator-adjusted size was already within every bound.
    Signals,
    CapitalPreservation,
    RemainingCapital,
    CircuitBreaker,
    /// Final interval: all remaining capital, no bounds applied.
    FinalInterval,
}

impl std::fmt::Display for BindingLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signals => write!(f, "signals"),
            Self::CapitalPreservation => write!(f, "capital_preservation"),
            Self::RemainingCapital => write!(f, "remaining_capital"),
            Self::CircuitBreaker => write!(f, "circuit_breaker"),
            Self::FinalInterval => write!(f, "final_interval"),
        }
    }
}

/// Every bound considered by the clamp, plus the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClampOutcome {
    pub amount: f64,
    pub min_future_allocation: f64,
    pub max_safe_buy: f64,
    pub circuit_breaker_max: f64,
    pub binding: BindingLimit,
}

/// Bound `adjusted_buy_size` by the capital-preservation reserve, the
/// remaining capital, and the circuit breaker.
pub fn apply_safety_clamp(
    adjusted_buy_size: f64,
    base_buy_size: f64,
    intervals_remaining: f64,
    remaining_capital: f64,
    plan: &PlanConfig,
) -> ClampOutcome {
    let min_future_allocation = base_buy_size * (intervals_remaining - 1.0) * plan.min_buy_percent;
    let max_safe_buy = remaining_capital - min_future_allocation;
    let circuit_breaker_max = remaining_capital * plan.circuit_breaker_ratio;

    let candidates = [
        (adjusted_buy_size, BindingLimit::Signals),
        (max_safe_buy, BindingLimit::CapitalPreservation),
        (remaining_capital, BindingLimit::RemainingCapital),
        (circuit_breaker_max, BindingLimit::CircuitBreaker),
    ];

    // Ties resolve to the earliest candidate.
    let (mut amount, mut binding) = candidates[0];
    for &(value, limit) in &candidates[1..] {
        if value < amount {
            amount = value;
            binding = limit;
        }
    }

    if amount < 0.0 {
        amount = 0.0;
    }

    ClampOutcome {
        amount,
        min_future_allocation,
        max_safe_buy,
        circuit_breaker_max,
        binding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_adjusted_size_passes_through() {
        let plan = PlanConfig::default();
        let out = apply_safety_clamp(100.0, 200.0, 50.0, 10_000.0, &plan);
        assert_eq!(out.amount, 100.0);
        assert_eq!(out.binding, BindingLimit::Signals);
    }

    #[test]
    fn circuit_breaker_caps_large_buys() {
        // Reserve: 10 * 4 * 0.4 = 16 -> max_safe_buy 984; breaker 250.
        let plan = PlanConfig::default();
        let out = apply_safety_clamp(900.0, 10.0, 5.0, 1_000.0, &plan);
        assert_eq!(out.circuit_breaker_max, 250.0);
        assert_eq!(out.amount, 250.0);
        assert_eq!(out.binding, BindingLimit::CircuitBreaker);
    }

    #[test]
    fn capital_preservation_reserves_future_minimums() {
        // Reserve: 400 * 4 * 0.4 = 640 -> max_safe_buy 360 < breaker 500.
        let plan = PlanConfig {
            circuit_breaker_ratio: 0.5,
            ..PlanConfig::default()
        };
        let out = apply_safety_clamp(800.0, 400.0, 5.0, 1_000.0, &plan);
        assert_eq!(out.min_future_allocation, 640.0);
        assert_eq!(out.max_safe_buy, 360.0);
        assert_eq!(out.amount, 360.0);
        assert_eq!(out.binding, BindingLimit::CapitalPreservation);
    }

    #[test]
    fn tie_with_remaining_capital_reports_preservation() {
        let plan = PlanConfig {
            circuit_breaker_ratio: 1.0,
            min_buy_percent: 0.0,
            ..PlanConfig::default()
        };
        let out = apply_safety_clamp(5_000.0, 100.0, 3.0, 1_000.0, &plan);
        // No reserve and no breaker: max_safe_buy equals remaining capital.
        assert_eq!(out.amount, 1_000.0);
        assert_eq!(out.binding, BindingLimit::CapitalPreservation);
    }

    #[test]
    fn negative_bound_floors_at_zero() {
        // Reserve 1000 * 9 * 0.4 = 3600 exceeds the 1000 left.
        let plan = PlanConfig::default();
        let out = apply_safety_clamp(300.0, 1_000.0, 10.0, 1_000.0, &plan);
        assert!(out.max_safe_buy < 0.0);
        assert_eq!(out.amount, 0.0);
        assert_eq!(out.binding, BindingLimit::CapitalPreservation);
    }

    #[test]
    fn binding_limit_display() {
        assert_eq!(BindingLimit::CircuitBreaker.to_string(), "circuit_breaker");
        assert_eq!(BindingLimit::FinalInterval.to_string(), "final_interval");
    }
}
