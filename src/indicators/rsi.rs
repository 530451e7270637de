// =============================================================================
// Relative Strength Index (RSI) — fixed-window variant
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// This is the unsmoothed form. Each output is computed independently from the
// `period` close-to-close deltas inside a window of `period + 1` candles:
//
//   avg_gain = sum(positive deltas) / period
//   avg_loss = sum(|negative deltas|) / period
//   RS       = avg_gain / avg_loss        (infinite when avg_loss == 0)
//   RSI      = 100 - 100 / (1 + RS)
//
// No Wilder smoothing is carried from one window to the next.
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

use crate::types::{Candle, IndicatorPoint};

/// Compute the RSI series for `data`.
///
/// One point per candle from index `period` onward (`data.len() - period`
/// points), aligned to the time of the candle closing each window.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `data.len() <= period` => empty vec (need `period` deltas)
/// - A window with no losses (including a flat one) yields 100.0.
pub fn calculate_rsi(data: &[Candle], period: usize) -> Vec<IndicatorPoint> {
    if period == 0 || data.len() <= period {
        return Vec::new();
    }

    let period_f = period as f64;
    data.windows(period + 1)
        .map(|window| {
            let (gains, losses) = window.windows(2).fold((0.0_f64, 0.0_f64), |(g, l), pair| {
                let delta = pair[1].close - pair[0].close;
                if delta > 0.0 {
                    (g + delta, l)
                } else {
                    (g, l - delta)
                }
            });

            let rsi = rsi_from_averages(gains / period_f, losses / period_f);
            IndicatorPoint::new(window[period].time, rsi)
        })
        .collect()
}

/// Most recent RSI value, if there is enough history.
pub fn current_rsi(data: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || data.len() <= period {
        return None;
    }
    calculate_rsi(&data[data.len() - period - 1..], period)
        .last()
        .map(|p| p.value)
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss == 0.0 {
        f64::INFINITY
    } else {
        avg_gain / avg_loss
    };
    100.0 - 100.0 / (1.0 + rs)
}

// =============================================================================
// Unit Tests
// =============================================================================
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

    fn series(closes: impl IntoIterator<Item = f64>) -> Vec<Candle> {
        candles(&closes.into_iter().collect::<Vec<_>>())
    }

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(calculate_rsi(&series([1.0, 2.0, 3.0]), 0).is_empty());
    }

    #[test]
    fn rsi_insufficient_data() {
        // 14 candles => 13 deltas < 14.
        assert!(calculate_rsi(&series((1..=14).map(f64::from)), 14).is_empty());
        assert!(calculate_rsi(&series((1..=5).map(f64::from)), 14).is_empty());
    }

    #[test]
    fn rsi_output_length_and_alignment() {
        let data = series((1..=30).map(f64::from));
        let rsi = calculate_rsi(&data, 14);
        assert_eq!(rsi.len(), 30 - 14);
        assert_eq!(rsi[0].time, data[14].time);
        assert_eq!(rsi.last().unwrap().time, data[29].time);
    }

    #[test]
    fn rsi_all_gains() {
        let rsi = calculate_rsi(&series((1..=30).map(f64::from)), 14);
        assert!(!rsi.is_empty());
        for p in &rsi {
            assert!((p.value - 100.0).abs() < 1e-10, "expected 100.0, got {}", p.value);
        }
    }

    #[test]
    fn rsi_all_losses() {
        let rsi = calculate_rsi(&series((1..=30).rev().map(f64::from)), 14);
        assert!(!rsi.is_empty());
        for p in &rsi {
            assert!(p.value.abs() < 1e-10, "expected 0.0, got {}", p.value);
        }
    }

    #[test]
    fn rsi_flat_market_reads_as_no_losses() {
        let rsi = calculate_rsi(&series(vec![100.0; 30]), 14);
        for p in &rsi {
            assert!((p.value - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_known_window() {
        // Deltas: +2, -1, +3 => gains 5, losses 1 => RS 5 => RSI 100 - 100/6.
        let rsi = calculate_rsi(&series([10.0, 12.0, 11.0, 14.0]), 3);
        assert_eq!(rsi.len(), 1);
        assert!((rsi[0].value - (100.0 - 100.0 / 6.0)).abs() < 1e-10);
    }

    #[test]
    fn rsi_windows_are_independent() {
        // The second window drops the leading +2 and adds a -4. Without
        // smoothing it only sees -1, +3, -4 => gains 3, losses 5.
        let rsi = calculate_rsi(&series([10.0, 12.0, 11.0, 14.0, 10.0]), 3);
        assert_eq!(rsi.len(), 2);
        let expected = 100.0 - 100.0 / (1.0 + 3.0 / 5.0);
        assert!((rsi[1].value - expected).abs() < 1e-10);
    }

    #[test]
    fn rsi_counts_exactly_period_deltas() {
        // The -50 drop sits just before the last window, so that window only
        // sees +1, +1.
        let rsi = calculate_rsi(&series([100.0, 50.0, 51.0, 52.0]), 2);
        assert_eq!(rsi.len(), 2);
        assert!((rsi[1].value - 100.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_range_check() {
        let data = series([
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ]);
        for p in calculate_rsi(&data, 14) {
            assert!((0.0..=100.0).contains(&p.value), "RSI {} out of range", p.value);
        }
    }

    #[test]
    fn current_rsi_matches_last_point() {
        let data = series([
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
        ]);
        let last = calculate_rsi(&data, 5).last().copied().unwrap();
        assert_eq!(current_rsi(&data, 5), Some(last.value));
        assert!(current_rsi(&data, 10).is_none());
    }
}
