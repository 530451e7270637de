// =============================================================================
// Indicator Summary — latest values and their readings
// =============================================================================
//
// Backs the "Indicators" panel: the newest value of every configured line plus
// a coarse interpretation. Missing history produces `None`, never a zero.
//
//   RSI  < 30           => Oversold (bullish)
//   RSI  > 70           => Overbought (bearish)
//   price vs SMA        => Bullish above, Bearish below, Neutral on equality
//   price vs lower band => Bullish above, otherwise Neutral
// =============================================================================

use serde::Serialize;

use crate::indicators::{bollinger, rsi, sma};
use crate::runtime_config::IndicatorPeriods;
use crate::types::Candle;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

/// Reading of an RSI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiZone {
    pub fn from_value(rsi: f64) -> Self {
        if rsi < RSI_OVERSOLD {
            Self::Oversold
        } else if rsi > RSI_OVERBOUGHT {
            Self::Overbought
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for RsiZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oversold => write!(f, "Oversold (Bullish)"),
            Self::Neutral => write!(f, "Neutral"),
            Self::Overbought => write!(f, "Overbought (Bearish)"),
        }
    }
}

/// Directional reading of price against a reference level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bias {
    Bullish,
    Neutral,
    Bearish,
}

impl Bias {
    /// Price against a moving average.
    pub fn against_average(price: f64, average: f64) -> Self {
        if price > average {
            Self::Bullish
        } else if price < average {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    /// Price against the lower Bollinger band. Only the bullish side is read.
    pub fn against_lower_band(price: f64, lower: f64) -> Self {
        if price > lower {
            Self::Bullish
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "Bullish"),
            Self::Neutral => write!(f, "Neutral"),
            Self::Bearish => write!(f, "Bearish"),
        }
    }
}

/// Signed distance of `price` from `level` in percent.
pub fn percent_from(price: f64, level: f64) -> Option<f64> {
    if level == 0.0 {
        return None;
    }
    Some((price - level) / level * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsiReading {
    pub period: usize,
    pub value: Option<f64>,
    pub zone: Option<RsiZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmaReading {
    pub period: usize,
    pub value: Option<f64>,
    pub bias: Option<Bias>,
    pub distance_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerReading {
    pub period: usize,
    pub upper: Option<f64>,
    pub middle: Option<f64>,
    pub lower: Option<f64>,
    pub lower_bias: Option<Bias>,
}

/// Latest indicator values for one candle history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSummary {
    /// Close of the newest candle.
    pub current_price: Option<f64>,
    pub rsi: Vec<RsiReading>,
    pub sma: Vec<SmaReading>,
    pub bollinger: BollingerReading,
}

impl IndicatorSummary {
    pub fn compute(candles: &[Candle], periods: &IndicatorPeriods, num_std: f64) -> Self {
        let current_price = candles.last().map(|c| c.close);

        let rsi = periods
            .rsi
            .iter()
            .map(|&period| {
                let value = rsi::current_rsi(candles, period);
                RsiReading {
                    period,
                    value,
                    zone: value.map(RsiZone::from_value),
                }
            })
            .collect();

        let sma = periods
            .sma
            .iter()
            .map(|&period| {
                let value = sma::current_sma(candles, period);
                let (bias, distance_pct) = match (current_price, value) {
                    (Some(price), Some(avg)) => {
                        (Some(Bias::against_average(price, avg)), percent_from(price, avg))
                    }
                    _ => (None, None),
                };
                SmaReading {
                    period,
                    value,
                    bias,
                    distance_pct,
                }
            })
            .collect();

        let bb_period = periods.bollinger;
        let start = candles.len().saturating_sub(bb_period);
        let bands = bollinger::calculate_bollinger(&candles[start..], bb_period, num_std).last();
        let bollinger = BollingerReading {
            period: bb_period,
            upper: bands.map(|b| b.0),
            middle: bands.map(|b| b.1),
            lower: bands.map(|b| b.2),
            lower_bias: match (current_price, bands) {
                (Some(price), Some((_, _, lower))) => Some(Bias::against_lower_band(price, lower)),
                _ => None,
            },
        };

        Self {
            current_price,
            rsi,
            sma,
            bollinger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(closes: impl IntoIterator<Item = f64>) -> Vec<Candle> {
        closes
            .into_iter()
            .enumerate()
            .map(|(i, c)| Candle::new(i as i64 * 60, c, c, c, c, 1.0))
            .collect()
    }

    fn periods() -> IndicatorPeriods {
        IndicatorPeriods {
            sma: vec![5, 20],
            rsi: vec![7, 14],
            bollinger: 20,
        }
    }

    #[test]
    fn rsi_zone_thresholds() {
        assert_eq!(RsiZone::from_value(29.9), RsiZone::Oversold);
        assert_eq!(RsiZone::from_value(30.0), RsiZone::Neutral);
        assert_eq!(RsiZone::from_value(70.0), RsiZone::Neutral);
        assert_eq!(RsiZone::from_value(70.1), RsiZone::Overbought);
        assert_eq!(RsiZone::Oversold.to_string(), "Oversold (Bullish)");
    }

    #[test]
    fn bias_against_average() {
        assert_eq!(Bias::against_average(101.0, 100.0), Bias::Bullish);
        assert_eq!(Bias::against_average(99.0, 100.0), Bias::Bearish);
        assert_eq!(Bias::against_average(100.0, 100.0), Bias::Neutral);
    }

    #[test]
    fn lower_band_never_reads_bearish() {
        assert_eq!(Bias::against_lower_band(90.0, 95.0), Bias::Neutral);
        assert_eq!(Bias::against_lower_band(95.0, 95.0), Bias::Neutral);
        assert_eq!(Bias::against_lower_band(96.0, 95.0), Bias::Bullish);
    }

    #[test]
    fn percent_from_level() {
        assert!((percent_from(110.0, 100.0).unwrap() - 10.0).abs() < 1e-12);
        assert!((percent_from(90.0, 100.0).unwrap() + 10.0).abs() < 1e-12);
        assert!(percent_from(1.0, 0.0).is_none());
    }

    #[test]
    fn summary_on_rising_market() {
        let data = candles((0..30).map(|i| 100.0 + f64::from(i)));
        let summary = IndicatorSummary::compute(&data, &periods(), 2.0);

        assert_eq!(summary.current_price, Some(129.0));
        for reading in &summary.rsi {
            assert_eq!(reading.value, Some(100.0));
            assert_eq!(reading.zone, Some(RsiZone::Overbought));
        }
        for reading in &summary.sma {
            assert_eq!(reading.bias, Some(Bias::Bullish));
            assert!(reading.distance_pct.unwrap() > 0.0);
        }
        assert_eq!(summary.bollinger.lower_bias, Some(Bias::Bullish));
        assert!((summary.bollinger.middle.unwrap() - 119.5).abs() < 1e-12);
    }

    #[test]
    fn summary_reports_missing_history_as_none() {
        let data = candles((0..10).map(f64::from));
        let summary = IndicatorSummary::compute(&data, &periods(), 2.0);

        assert!(summary.rsi[0].value.is_some()); // RSI 7 fits in 10 candles
        assert!(summary.rsi[1].value.is_none());
        assert!(summary.rsi[1].zone.is_none());
        assert!(summary.sma[0].value.is_some());
        assert!(summary.sma[1].value.is_none());
        assert!(summary.sma[1].bias.is_none());
        assert!(summary.bollinger.middle.is_none());
        assert!(summary.bollinger.lower_bias.is_none());
    }

    #[test]
    fn summary_of_empty_history() {
        let summary = IndicatorSummary::compute(&[], &periods(), 2.0);
        assert!(summary.current_price.is_none());
        assert!(summary.sma.iter().all(|r| r.value.is_none()));
    }
}
