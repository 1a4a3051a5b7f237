// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the three indicators consumed by
// the allocation engine. Every calculator reads only candle closes and returns
// a `Result` so that short or degenerate histories abort the buy cycle instead
// of silently falling back to a default.

pub mod bollinger;
pub mod rsi;
pub mod volatility;

pub use bollinger::{calculate_bollinger, BollingerBands};
pub use rsi::calculate_rsi;
pub use volatility::calculate_volatility;
