// =============================================================================
// Realized Volatility — annualized standard deviation of log returns
// =============================================================================
//
//   r_i  = ln(close_i / close_{i-1})      over the last `lookback` returns
//   var  = mean(r_i^2)                    zero-mean, drift ignored
//   vol  = sqrt(var) * sqrt(periods_per_year)
//
// periods_per_year = (24 / bar_hours) * 365, i.e. 2190 for 4-hour bars.
// The bar width is supplied by the caller rather than inferred from the
// candle timestamps.
// =============================================================================

use crate::errors::IndicatorError;
use crate::types::Candle;

/// Seven days of 4-hour bars.
pub const DEFAULT_LOOKBACK: usize = 42;
pub const DEFAULT_BAR_HOURS: f64 = 4.0;

const NAME: &str = "volatility";

/// Number of bars of `bar_hours` width in a 365-day year.
pub fn periods_per_year(bar_hours: f64) -> f64 {
    (24.0 / bar_hours) * 365.0
}

/// Annualized realized volatility over the most recent `lookback` log
/// returns (which needs `lookback + 1` candles).
pub fn calculate_volatility(
    candles: &[Candle],
    lookback: usize,
    bar_hours: f64,
) -> Result<f64, IndicatorError> {
    if lookback == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: NAME });
    }
    let required = lookback + 1;
    if candles.len() < required {
        return Err(IndicatorError::InsufficientData {
            indicator: NAME,
            required,
            available: candles.len(),
        });
    }

    let window = &candles[candles.len() - required..];
    let sum_sq: f64 = window
        .windows(2)
        .map(|w| (w[1].close / w[0].close).ln().powi(2))
        .sum();

    let variance = sum_sq / lookback as f64;
    let annualized = variance.sqrt() * periods_per_year(bar_hours).sqrt();

    // Non-positive closes or a non-positive bar width end up here.
    if annualized.is_finite() {
        Ok(annualized)
    } else {
        Err(IndicatorError::NonFinite { indicator: NAME })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::candles_from_closes;

    #[test]
    fn four_hour_bars_give_2190_periods() {
        assert_eq!(periods_per_year(4.0), 2190.0);
        assert_eq!(periods_per_year(24.0), 365.0);
    }

    #[test]
    fn constant_prices_have_zero_volatility() {
        let candles = candles_from_closes(&[100.0; 43]);
        assert_eq!(calculate_volatility(&candles, 42, 4.0).unwrap(), 0.0);
    }

    #[test]
    fn alternating_returns_match_hand_calculation() {
        // Every return is +/- ln(1.01), so the zero-mean std dev is ln(1.01).
        let closes: Vec<f64> = (0..43).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let vol = calculate_volatility(&candles_from_closes(&closes), 42, 4.0).unwrap();
        let expected = 1.01_f64.ln() * 2190.0_f64.sqrt();
        assert!((vol - expected).abs() < 1e-9, "expected {expected}, got {vol}");
    }

    #[test]
    fn only_the_lookback_window_is_used() {
        let mut closes = vec![1.0, 500.0, 3.0];
        closes.extend(std::iter::repeat(100.0).take(43));
        let vol = calculate_volatility(&candles_from_closes(&closes), 42, 4.0).unwrap();
        assert_eq!(vol, 0.0);
    }

    #[test]
    fn bar_width_scales_annualization() {
        let closes: Vec<f64> = (0..43).map(|i| if i % 2 == 0 { 100.0 } else { 102.0 }).collect();
        let candles = candles_from_closes(&closes);
        let four_hour = calculate_volatility(&candles, 42, 4.0).unwrap();
        let daily = calculate_volatility(&candles, 42, 24.0).unwrap();
        assert!((four_hour / daily - 6.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn insufficient_data_boundary() {
        assert_eq!(
            calculate_volatility(&candles_from_closes(&[1.0; 42]), 42, 4.0),
            Err(IndicatorError::InsufficientData {
                indicator: "volatility",
                required: 43,
                available: 42,
            })
        );
        assert!(calculate_volatility(&candles_from_closes(&[1.0; 43]), 42, 4.0).is_ok());
    }

    #[test]
    fn non_positive_close_is_rejected() {
        let mut closes = vec![100.0; 43];
        closes[20] = 0.0;
        assert_eq!(
            calculate_volatility(&candles_from_closes(&closes), 42, 4.0),
            Err(IndicatorError::NonFinite { indicator: "volatility" })
        );
    }
}
