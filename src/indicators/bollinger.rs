// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). σ is the population standard deviation of the
// closes in the same trailing window (divide by `period`, not `period - 1`).

use serde::Serialize;

use crate::types::{Candle, IndicatorPoint};

/// Conventional band multiplier.
pub const DEFAULT_NUM_STD: f64 = 2.0;

/// The three band series. All share the SMA's time axis and point count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: Vec<IndicatorPoint>,
    pub middle: Vec<IndicatorPoint>,
    pub lower: Vec<IndicatorPoint>,
}

impl BollingerBands {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.middle.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.middle.len()
    }

    /// Latest `(upper, middle, lower)` triple.
    pub fn last(&self) -> Option<(f64, f64, f64)> {
        Some((
            self.upper.last()?.value,
            self.middle.last()?.value,
            self.lower.last()?.value,
        ))
    }
}

/// Calculate Bollinger Bands over `data` with look-back `period` and band
/// multiplier `num_std`.
///
/// Returns empty bands when `period == 0` or `data.len() < period`.
pub fn calculate_bollinger(data: &[Candle], period: usize, num_std: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands::default();
    }

    let count = data.len() - period + 1;
    let mut bands = BollingerBands {
        upper: Vec::with_capacity(count),
        middle: Vec::with_capacity(count),
        lower: Vec::with_capacity(count),
    };

    let period_f = period as f64;
    for window in data.windows(period) {
        let time = window[period - 1].time;
        let middle = window.iter().map(|c| c.close).sum::<f64>() / period_f;
        let variance = window
            .iter()
            .map(|c| (c.close - middle).powi(2))
            .sum::<f64>()
            / period_f;
        let offset = num_std * variance.sqrt();

        bands.upper.push(IndicatorPoint::new(time, middle + offset));
        bands.middle.push(IndicatorPoint::new(time, middle));
        bands.lower.push(IndicatorPoint::new(time, middle - offset));
    }

    bands
}
