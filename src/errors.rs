use thiserror::Error;

/// Failures raised by the indicator calculators.
///
/// None of these have a fallback value: a cycle that hits one is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("{indicator}: insufficient data ({available} candles, need {required})")]
    InsufficientData {
        indicator: &'static str,
        required: usize,
        available: usize,
    },

    #[error("{indicator}: period must be at least 1")]
    InvalidPeriod { indicator: &'static str },

    #[error("{indicator}: calculation produced a non-finite value")]
    NonFinite { indicator: &'static str },
}

/// Failures raised by the allocation orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("price must be finite and positive, got {0}")]
    InvalidPrice(f64),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// Failures raised at the persistence boundary.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("state version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_indicator() {
        let err = IndicatorError::InsufficientData {
            indicator: "rsi",
            required: 28,
            available: 10,
        };
        assert_eq!(err.to_string(), "rsi: insufficient data (10 candles, need 28)");
    }

    #[test]
    fn allocation_error_is_transparent_over_indicator() {
        let err: AllocationError = IndicatorError::InvalidPeriod { indicator: "bollinger" }.into();
        assert_eq!(err.to_string(), "bollinger: period must be at least 1");
    }
}
