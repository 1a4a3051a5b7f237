// =============================================================================
// Adaptive Allocation Engine
// =============================================================================
//
// candles -> indicators -> multipliers
//                               \
//   schedule -> base buy size -> x mean reversion x indicator factor -> clamp
//
// `calculate_buy_size` is a pure function of its arguments: no I/O, no clock
// reads, no hidden state. Two calls with the same inputs return the same
// decision. Ledger updates belong to the caller, after a confirmed fill.
// =============================================================================

pub mod clamp;
pub mod mean_reversion;
pub mod multipliers;
pub mod scheduler;

use serde::Serialize;

use crate::config::PlanConfig;
use crate::errors::AllocationError;
use crate::indicators::{calculate_bollinger, calculate_rsi, calculate_volatility, BollingerBands};
use crate::ledger::AccountState;
use crate::types::Candle;

pub use clamp::{apply_safety_clamp, BindingLimit, ClampOutcome};
pub use mean_reversion::{cost_basis, mean_reversion_factor};
pub use multipliers::{bollinger_multiplier, rsi_multiplier, volatility_multiplier};
pub use scheduler::Schedule;

/// Raw indicator readings and the multipliers derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalBreakdown {
    pub cost_basis: f64,
    pub mean_reversion_factor: f64,
    pub volatility: f64,
    pub rsi: f64,
    pub bands: BollingerBands,
    pub band_position: f64,
    pub squeeze: bool,
    pub volatility_multiplier: f64,
    pub rsi_multiplier: f64,
    pub bollinger_multiplier: f64,
    pub indicator_factor: f64,
    pub adjusted_buy_size: f64,
    pub clamp: ClampOutcome,
}

/// How much quote currency to spend this cycle, with an advisory breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BuyDecision {
    /// Quote currency to spend. Never negative, never above the remaining
    /// capital.
    pub amount: f64,
    pub schedule: Schedule,
    /// Zero in the final interval, where no baseline is computed.
    pub base_buy_size: f64,
    pub binding: BindingLimit,
    /// `None` in the final interval, where indicators are not consulted.
    pub signals: Option<SignalBreakdown>,
}

impl BuyDecision {
    pub fn is_final_interval(&self) -> bool {
        self.binding == BindingLimit::FinalInterval
    }
}

/// Weighted blend of the three indicator multipliers. The weights are used as
/// given and need not sum to one.
pub fn indicator_factor(
    volatility_multiplier: f64,
    rsi_multiplier: f64,
    bollinger_multiplier: f64,
    plan: &PlanConfig,
) -> f64 {
    volatility_multiplier * plan.volatility_weight
        + rsi_multiplier * plan.rsi_weight
        + bollinger_multiplier * plan.bb_weight
}

/// Decide the spend for the cycle at `now_ms`.
///
/// In the final interval the whole remaining capital is returned without
/// looking at the candles. Otherwise every indicator must have enough history;
/// a short history is an error, never a default.
pub fn calculate_buy_size(
    price: f64,
    candles: &[Candle],
    account: &AccountState,
    plan: &PlanConfig,
    now_ms: i64,
) -> Result<BuyDecision, AllocationError> {
    if !(price.is_finite() && price > 0.0) {
        return Err(AllocationError::InvalidPrice(price));
    }

    let remaining = account.remaining_capital.max(0.0);
    let schedule = Schedule::at(account.start_time, now_ms, plan);

    if schedule.is_final_interval() {
        return Ok(BuyDecision {
            amount: remaining,
            schedule,
            base_buy_size: 0.0,
            binding: BindingLimit::FinalInterval,
            signals: None,
        });
    }

    let base_buy_size = schedule.base_buy_size(remaining);

    // --- Mean reversion --------------------------------------------------------
    let basis = cost_basis(price, account.weighted_sum_cost, account.total_accumulated);
    let reversion = mean_reversion_factor(price, basis, plan);

    // --- Indicators --------------------------------------------------------------
    let volatility = calculate_volatility(candles, plan.volatility_lookback, plan.candle_interval_hours)?;
    let rsi = calculate_rsi(candles, plan.rsi_period)?;
    let bands = calculate_bollinger(candles, plan.bb_period, plan.bb_std_dev_multiplier)?;
    let band_position = bands.position(price);

    let vol_mult = volatility_multiplier(volatility);
    let rsi_mult = rsi_multiplier(rsi);
    let bb_mult = bollinger_multiplier(band_position);
    let combined = indicator_factor(vol_mult, rsi_mult, bb_mult, plan);

    // --- Clamp -------------------------------------------------------------------
    let adjusted_buy_size = base_buy_size * reversion * combined;
    let clamp = apply_safety_clamp(
        adjusted_buy_size,
        base_buy_size,
        schedule.intervals_remaining,
        remaining,
        plan,
    );

    Ok(BuyDecision {
        amount: clamp.amount,
        schedule,
        base_buy_size,
        binding: clamp.binding,
        signals: Some(SignalBreakdown {
            cost_basis: basis,
            mean_reversion_factor: reversion,
            volatility,
            rsi,
            bands,
            band_position,
            squeeze: bands.is_squeeze(),
            volatility_multiplier: vol_mult,
            rsi_multiplier: rsi_mult,
            bollinger_multiplier: bb_mult,
            indicator_factor: combined,
            adjusted_buy_size,
            clamp,
        }),
    })
}
