// =============================================================================
// Multiplier Mappers — indicator value -> dimensionless buy-size multiplier
// =============================================================================
//
// Values above 1.0 lean into the buy, values below 1.0 hold back.

/// Annualized volatility treated as "normal" (1.0x at this level).
pub const BASELINE_VOLATILITY: f64 = 0.6;
pub const MIN_VOLATILITY_MULTIPLIER: f64 = 0.8;
pub const MAX_VOLATILITY_MULTIPLIER: f64 = 1.5;

/// RSI multiplier, evaluated top to bottom (first match wins):
///
/// | RSI            | multiplier |
/// |----------------|------------|
/// | < 30           | 1.5        |
/// | 30 ..< 40      | 1.2        |
/// | > 70           | 0.5        |
/// | 60 <.. 70      | 0.8        |
/// | otherwise      | 1.0        |
pub fn rsi_multiplier(rsi: f64) -> f64 {
    if rsi < 30.0 {
        1.5
    } else if rsi < 40.0 {
        1.2
    } else if rsi > 70.0 {
        0.5
    } else if rsi > 60.0 {
        0.8
    } else {
        1.0
    }
}

/// Bollinger multiplier from the price position `p` inside the bands
/// (0 = lower band, 1 = upper band).
///
/// Saturates at 2.5 below the lower band and 0.3 above the upper band. The
/// outer segments ramp linearly towards those extremes; the middle segment is
/// its own line, so the curve steps at p = 0.3 and p = 0.7.
pub fn bollinger_multiplier(position: f64) -> f64 {
    if position <= 0.0 {
        2.5
    } else if position >= 1.0 {
        0.3
    } else if position < 0.3 {
        1.5 + (0.3 - position) * (10.0 / 3.0)
    } else if position > 0.7 {
        0.3 + (1.0 - position) * (7.0 / 3.0)
    } else {
        0.3 + (1.0 - position) * 1.4
    }
}

/// Volatility multiplier: 0.7 + 0.5 * (vol / 0.6), clamped to [0.8, 1.5].
pub fn volatility_multiplier(volatility: f64) -> f64 {
    let ratio = volatility / BASELINE_VOLATILITY;
    (0.7 + ratio * 0.5).clamp(MIN_VOLATILITY_MULTIPLIER, MAX_VOLATILITY_MULTIPLIER)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn rsi_thresholds() {
        assert_eq!(rsi_multiplier(0.0), 1.5);
        assert_eq!(rsi_multiplier(29.99), 1.5);
        assert_eq!(rsi_multiplier(30.0), 1.2);
        assert_eq!(rsi_multiplier(39.99), 1.2);
        assert_eq!(rsi_multiplier(40.0), 1.0);
        assert_eq!(rsi_multiplier(60.0), 1.0);
        assert_eq!(rsi_multiplier(60.01), 0.8);
        assert_eq!(rsi_multiplier(70.0), 0.8);
        assert_eq!(rsi_multiplier(70.01), 0.5);
        assert_eq!(rsi_multiplier(100.0), 0.5);
    }

    #[test]
    fn bollinger_saturates_outside_the_bands() {
        assert_eq!(bollinger_multiplier(-0.5), 2.5);
        assert_eq!(bollinger_multiplier(0.0), 2.5);
        assert_eq!(bollinger_multiplier(1.0), 0.3);
        assert_eq!(bollinger_multiplier(3.0), 0.3);
    }

    #[test]
    fn bollinger_is_continuous_at_the_band_edges() {
        assert!((bollinger_multiplier(1e-12) - 2.5).abs() < EPS);
        assert!((bollinger_multiplier(1.0 - 1e-12) - 0.3).abs() < EPS);
    }

    #[test]
    fn bollinger_segment_values() {
        assert!((bollinger_multiplier(0.15) - 2.0).abs() < EPS);
        assert!((bollinger_multiplier(0.5) - 1.0).abs() < EPS);
        assert!((bollinger_multiplier(0.85) - 0.65).abs() < EPS);
    }

    #[test]
    fn bollinger_steps_at_inner_breakpoints() {
        // Lower ramp ends at 1.5 while the middle line starts at 1.28.
        assert!((bollinger_multiplier(0.3 - 1e-12) - 1.5).abs() < EPS);
        assert!((bollinger_multiplier(0.3) - 1.28).abs() < EPS);
        // Middle line ends at 0.72 while the upper ramp starts at 1.0.
        assert!((bollinger_multiplier(0.7) - 0.72).abs() < EPS);
        assert!((bollinger_multiplier(0.7 + 1e-12) - 1.0).abs() < EPS);
    }

    #[test]
    fn bollinger_is_non_increasing_within_each_segment() {
        let segments = [(1, 299), (300, 700), (701, 999)];
        for (lo, hi) in segments {
            let mut prev = f64::INFINITY;
            for i in lo..=hi {
                let p = i as f64 / 1000.0;
                let m = bollinger_multiplier(p);
                assert!(m <= prev + EPS, "multiplier rose at p={p}");
                prev = m;
            }
        }
    }

    #[test]
    fn volatility_multiplier_at_baseline_is_one_point_two() {
        assert!((volatility_multiplier(0.6) - 1.2).abs() < EPS);
    }

    #[test]
    fn volatility_multiplier_clamps() {
        assert_eq!(volatility_multiplier(0.0), 0.8);
        assert_eq!(volatility_multiplier(5.0), 1.5);
        assert!((volatility_multiplier(0.36) - 1.0).abs() < EPS);
    }
}
