// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions over an ascending candle
// sequence. Nothing here keeps state between calls. Every function returns an
// empty series when the input is shorter than the requested period.

pub mod bollinger;
pub mod rsi;
pub mod signals;
pub mod sma;

pub use bollinger::{calculate_bollinger, DEFAULT_NUM_STD};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
