// =============================================================================
// Bollinger Bands
// =============================================================================
//
// The middle band is the SMA of the last `period` closes; the upper and lower
// bands sit `k` population standard deviations away from it.
//
// The allocator reads the current price's position inside the envelope,
//   p = (price - lower) / (upper - lower)
// where p = 0 is the lower band and p = 1 the upper band.

use serde::Serialize;

use crate::errors::IndicatorError;
use crate::types::Candle;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STD_DEV_MULTIPLIER: f64 = 2.0;

/// Band width below this fraction of the middle band counts as a squeeze.
pub const SQUEEZE_THRESHOLD: f64 = 0.04;

const NAME: &str = "bollinger";

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Position of `price` within the bands: 0 at the lower band, 1 at the
    /// upper band, outside [0, 1] beyond them.
    ///
    /// Collapsed bands (zero width, e.g. a perfectly flat window) place every
    /// price at the midpoint, 0.5.
    pub fn position(&self, price: f64) -> f64 {
        let width = self.upper - self.lower;
        if width <= 0.0 {
            return 0.5;
        }
        (price - self.lower) / width
    }

    /// Band width normalised by the middle band.
    pub fn relative_width(&self) -> f64 {
        (self.upper - self.lower) / self.middle
    }

    /// Low-volatility regime: band width under 4 % of the middle band.
    pub fn is_squeeze(&self) -> bool {
        self.relative_width() < SQUEEZE_THRESHOLD
    }
}

/// Calculate Bollinger Bands over the most recent `period` closes.
///
/// Fails with `InsufficientData` when fewer than `period` candles exist.
pub fn calculate_bollinger(
    candles: &[Candle],
    period: usize,
    std_dev_multiplier: f64,
) -> Result<BollingerBands, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: NAME });
    }
    if candles.len() < period {
        return Err(IndicatorError::InsufficientData {
            indicator: NAME,
            required: period,
            available: candles.len(),
        });
    }

    let window = &candles[candles.len() - period..];
    let period_f = period as f64;

    let middle = window.iter().map(|c| c.close).sum::<f64>() / period_f;
    let variance = window.iter().map(|c| (c.close - middle).powi(2)).sum::<f64>() / period_f;
    let std_dev = variance.sqrt();

    let bands = BollingerBands {
        upper: middle + std_dev * std_dev_multiplier,
        middle,
        lower: middle - std_dev * std_dev_multiplier,
    };

    if bands.upper.is_finite() && bands.lower.is_finite() {
        Ok(bands)
    } else {
        Err(IndicatorError::NonFinite { indicator: NAME })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::candles_from_closes;

    #[test]
    fn bollinger_known_values() {
        // Closes 1..=20: mean 10.5, population variance (n^2 - 1) / 12 = 33.25.
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&candles_from_closes(&closes), 20, 2.0).unwrap();
        let sd = 33.25_f64.sqrt();
        assert!((bb.middle - 10.5).abs() < 1e-12);
        assert!((bb.upper - (10.5 + 2.0 * sd)).abs() < 1e-12);
        assert!((bb.lower - (10.5 - 2.0 * sd)).abs() < 1e-12);
    }

    #[test]
    fn bollinger_uses_most_recent_window() {
        let mut closes = vec![1_000.0; 10];
        closes.extend(std::iter::repeat(50.0).take(20));
        let bb = calculate_bollinger(&candles_from_closes(&closes), 20, 2.0).unwrap();
        assert_eq!(bb.middle, 50.0);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let candles = candles_from_closes(&[1.0; 19]);
        assert_eq!(
            calculate_bollinger(&candles, 20, 2.0),
            Err(IndicatorError::InsufficientData {
                indicator: "bollinger",
                required: 20,
                available: 19,
            })
        );
        assert!(calculate_bollinger(&candles_from_closes(&[1.0; 20]), 20, 2.0).is_ok());
    }

    #[test]
    fn bollinger_flat_window_collapses_to_price() {
        let candles = candles_from_closes(&[42_000.0; 60]);
        let bb = calculate_bollinger(&candles, 20, 2.0).unwrap();
        assert_eq!(bb.upper, 42_000.0);
        assert_eq!(bb.middle, 42_000.0);
        assert_eq!(bb.lower, 42_000.0);
        assert_eq!(bb.position(42_000.0), 0.5);
        assert_eq!(bb.position(10.0), 0.5);
    }

    #[test]
    fn position_spans_the_envelope() {
        let bb = BollingerBands {
            upper: 110.0,
            middle: 100.0,
            lower: 90.0,
        };
        assert_eq!(bb.position(90.0), 0.0);
        assert_eq!(bb.position(100.0), 0.5);
        assert_eq!(bb.position(110.0), 1.0);
        assert!(bb.position(80.0) < 0.0);
    }

    #[test]
    fn squeeze_detection() {
        let tight = BollingerBands {
            upper: 101.0,
            middle: 100.0,
            lower: 99.0,
        };
        let wide = BollingerBands {
            upper: 105.0,
            middle: 100.0,
            lower: 95.0,
        };
        assert!(tight.is_squeeze());
        assert!(!wide.is_squeeze());
        assert!(calculate_bollinger(&candles_from_closes(&[10.0; 20]), 20, 2.0).unwrap().is_squeeze());
    }
}
