// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Unweighted mean of the trailing `period` closes:
//   SMA_i = (close_{i-period+1} + ... + close_i) / period
// =============================================================================

use crate::types::{Candle, IndicatorPoint};

/// Compute the SMA series for `data`.
///
/// One point per candle from index `period - 1` onward, each aligned to the
/// time of the candle that closes its window. The result has
/// `data.len() - period + 1` points, or none when `data.len() < period`.
pub fn calculate_sma(data: &[Candle], period: usize) -> Vec<IndicatorPoint> {
    if period == 0 || data.len() < period {
        return Vec::new();
    }

    let period_f = period as f64;
    data.windows(period)
        .map(|window| {
            let sum: f64 = window.iter().map(|c| c.close).sum();
            IndicatorPoint::new(window[period - 1].time, sum / period_f)
        })
        .collect()
}

/// Most recent SMA value, if there is enough history.
pub fn current_sma(data: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    Some(window.iter().map(|c| c.close).sum::<f64>() / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60, c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn sma_basic_window() {
        let data = candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let sma = calculate_sma(&data, 3);
        let values: Vec<f64> = sma.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        let times: Vec<i64> = sma.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![120, 180, 240]);
    }

    #[test]
    fn sma_length_matches_input_minus_period() {
        let data = candles(&(1..=50).map(|x| x as f64).collect::<Vec<_>>());
        for period in [1, 5, 20, 50] {
            assert_eq!(calculate_sma(&data, period).len(), 50 - period + 1);
        }
        assert!(calculate_sma(&data, 51).is_empty());
    }

    #[test]
    fn sma_insufficient_data() {
        let data = candles(&[1.0, 2.0]);
        assert!(calculate_sma(&data, 3).is_empty());
        assert!(calculate_sma(&[], 3).is_empty());
    }

    #[test]
    fn sma_period_zero() {
        let data = candles(&[1.0, 2.0, 3.0]);
        assert!(calculate_sma(&data, 0).is_empty());
        assert!(current_sma(&data, 0).is_none());
    }

    #[test]
    fn sma_values_are_window_means() {
        let closes = [10.0, 12.5, 9.0, 14.0, 11.0, 13.0, 8.5];
        let data = candles(&closes);
        let sma = calculate_sma(&data, 4);
        for (k, point) in sma.iter().enumerate() {
            let expected = closes[k..k + 4].iter().sum::<f64>() / 4.0;
            assert!((point.value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn current_sma_matches_last_point() {
        let data = candles(&[3.0, 6.0, 9.0, 12.0]);
        let last = calculate_sma(&data, 2).last().copied().unwrap();
        assert_eq!(current_sma(&data, 2), Some(last.value));
    }
}
