// =============================================================================
// Shared types used across the DCA allocator
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single fixed-width OHLCV bar. Sequences are ordered ascending by
/// `timestamp`; the allocation engine only reads `close`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time in milliseconds since the UNIX epoch.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Extract the close prices of `candles`, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Whether orders reach the exchange or are simulated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    Demo,
    Live,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "demo"),
            Self::Live => write!(f, "live"),
        }
    }
}

impl std::str::FromStr for AccountMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "live" => Ok(Self::Live),
            other => anyhow::bail!("unknown account mode '{other}' (expected demo or live)"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_mode_parses_case_insensitively() {
        assert_eq!("LIVE".parse::<AccountMode>().unwrap(), AccountMode::Live);
        assert_eq!(" demo ".parse::<AccountMode>().unwrap(), AccountMode::Demo);
        assert!("paper".parse::<AccountMode>().is_err());
    }

    #[test]
    fn account_mode_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&AccountMode::Live).unwrap(), "\"live\"");
        assert_eq!(AccountMode::default(), AccountMode::Demo);
    }

    #[test]
    fn closes_preserve_order() {
        let candles = test_support::candles_from_closes(&[1.0, 2.0, 3.0]);
        assert_eq!(closes(&candles), vec![1.0, 2.0, 3.0]);
        assert_eq!(candles[1].timestamp, 14_400_000);
    }
}
