// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Compute price changes from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Smooth every remaining change with Wilder's recursion:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// At least `2 * period` candles are required so the smoothing has a full
// period of changes to settle after the seed.
// =============================================================================

use crate::errors::IndicatorError;
use crate::types::{closes, Candle};

pub const DEFAULT_PERIOD: usize = 14;

const NAME: &str = "rsi";

/// Compute the most recent RSI value over `candles`.
///
/// # Edge cases
/// - `period == 0` => `InvalidPeriod`
/// - `candles.len() < 2 * period` => `InsufficientData`
/// - A final average loss of zero yields exactly 100.0, including a flat
///   market with no movement at all.
pub fn calculate_rsi(candles: &[Candle], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: NAME });
    }
    let required = period * 2;
    if candles.len() < required {
        return Err(IndicatorError::InsufficientData {
            indicator: NAME,
            required,
            available: candles.len(),
        });
    }

    // --- Compute price changes ----------------------------------------------
    let changes: Vec<f64> = closes(candles).windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` changes --------------------
    let period_f = period as f64;
    let (sum_gain, sum_loss) = changes[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| (g + d.max(0.0), l + (-d).max(0.0)));

    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    // --- Wilder's smoothing for subsequent changes ---------------------------
    for &change in &changes[period..] {
        avg_gain = (avg_gain * (period_f - 1.0) + change.max(0.0)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + (-change).max(0.0)) / period_f;
    }

    let rsi = rsi_from_averages(avg_gain, avg_loss);
    if rsi.is_finite() {
        Ok(rsi)
    } else {
        Err(IndicatorError::NonFinite { indicator: NAME })
    }
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
