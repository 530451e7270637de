use tracing::trace;

use crate::types::Candle;

// ---------------------------------------------------------------------------
// CandleHistory -- bounded, ascending candle window for one chart session
// ---------------------------------------------------------------------------

/// The candles a session computes its indicators over.
///
/// A full load replaces the window outright. Live ticks are merged one candle
/// at a time: a candle with the same time as the newest held candle replaces
/// it in place (the bucket is still forming), a newer candle is appended and
/// the window is trimmed to `capacity`, and an older candle is dropped.
#[derive(Debug, Clone)]
pub struct CandleHistory {
    candles: Vec<Candle>,
    capacity: usize,
}

/// What a merge did to the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub appended: usize,
    pub replaced: usize,
    pub dropped: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.appended > 0 || self.replaced > 0
    }
}

impl CandleHistory {
    /// Create an empty window holding at most `capacity` candles.
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Replace the whole window. `candles` must already be ascending and
    /// unique by time.
    pub fn replace(&mut self, candles: Vec<Candle>) {
        self.candles = candles;
        self.trim();
    }

    /// Merge ascending, deduplicated live candles into the window.
    pub fn merge(&mut self, incoming: &[Candle]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for candle in incoming {
            match self.candles.last().map(|c| c.time) {
                Some(newest) if candle.time < newest => {
                    trace!(time = candle.time, newest, "stale candle dropped");
                    outcome.dropped += 1;
                }
                Some(newest) if candle.time == newest => {
                    if let Some(last) = self.candles.last_mut() {
                        *last = *candle;
                    }
                    outcome.replaced += 1;
                }
                _ => {
                    self.candles.push(*candle);
                    outcome.appended += 1;
                }
            }
        }

        self.trim();
        outcome
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    fn trim(&mut self) {
        if self.candles.len() > self.capacity {
            let excess = self.candles.len() - self.capacity;
            self.candles.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(time: i64, close: f64) -> Candle {
        Candle::new(time, close, close + 1.0, close - 1.0, close, 100.0)
    }

    #[test]
    fn replace_trims_to_capacity() {
        let mut history = CandleHistory::new(3);
        history.replace((0..5).map(|i| sample_candle(i * 60, 100.0 + i as f64)).collect());

        assert_eq!(history.len(), 3);
        let closes: Vec<f64> = history.as_slice().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn same_bucket_replaces_in_place() {
        let mut history = CandleHistory::new(10);
        history.replace(vec![sample_candle(0, 50.0), sample_candle(60, 51.0)]);

        let outcome = history.merge(&[sample_candle(60, 52.0)]);
        assert_eq!(outcome.replaced, 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(|c| c.close), Some(52.0));
    }

    #[test]
    fn newer_bucket_appends_and_trims() {
        let mut history = CandleHistory::new(2);
        history.replace(vec![sample_candle(0, 50.0), sample_candle(60, 51.0)]);

        let outcome = history.merge(&[sample_candle(120, 53.0)]);
        assert_eq!(outcome.appended, 1);
        let times: Vec<i64> = history.as_slice().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![60, 120]);
    }

    #[test]
    fn older_bucket_is_dropped() {
        let mut history = CandleHistory::new(10);
        history.replace(vec![sample_candle(0, 50.0), sample_candle(60, 51.0)]);

        let outcome = history.merge(&[sample_candle(0, 49.0)]);
        assert_eq!(outcome.dropped, 1);
        assert!(!outcome.changed());
        assert_eq!(history.as_slice()[0].close, 50.0);
    }

    #[test]
    fn merge_into_empty_window() {
        let mut history = CandleHistory::new(10);
        let outcome = history.merge(&[sample_candle(0, 1.0), sample_candle(60, 2.0)]);
        assert_eq!(outcome.appended, 2);
        assert_eq!(history.len(), 2);
    }
}
