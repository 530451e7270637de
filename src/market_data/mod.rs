// =============================================================================
// Market Data — fail-closed fetch boundary
// =============================================================================
//
// `MarketSource` is the raw exchange seam (Binance in production, an in-memory
// fake in tests). `MarketDataClient` wraps a source and never lets an error
// through: a failed candle fetch yields an empty sequence, a failed ticker
// fetch yields a zeroed snapshot, and the failure is logged.
// =============================================================================

pub mod history;

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{Candle, Interval, MarketSnapshot};

pub use history::CandleHistory;

/// Raw upstream feed of candles and 24h ticker stats.
pub trait MarketSource: Send + Sync + 'static {
    fn klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Candle>>> + Send;

    fn ticker_24h(&self, symbol: &str) -> impl Future<Output = Result<MarketSnapshot>> + Send;
}

/// Fail-closed wrapper around a [`MarketSource`].
#[derive(Debug, Clone)]
pub struct MarketDataClient<S> {
    source: S,
}

impl<S: MarketSource> MarketDataClient<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch up to `limit` candles, deduplicated by time and sorted ascending.
    /// Returns an empty vec on any transport or parse failure.
    pub async fn fetch_candles(&self, symbol: &str, interval: Interval, limit: u32) -> Vec<Candle> {
        match self.source.klines(symbol, interval, limit).await {
            Ok(raw) => {
                let fetched = raw.len();
                let candles = normalize_candles(raw);
                if candles.len() != fetched {
                    debug!(
                        symbol,
                        %interval,
                        fetched,
                        kept = candles.len(),
                        "duplicate candle timestamps dropped"
                    );
                }
                candles
            }
            Err(e) => {
                warn!(symbol, %interval, limit, error = %e, "candle fetch failed — returning empty series");
                Vec::new()
            }
        }
    }

    /// Fetch the 24h ticker. Returns a zeroed snapshot on failure.
    pub async fn fetch_snapshot(&self, symbol: &str) -> MarketSnapshot {
        match self.source.ticker_24h(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol, error = %e, "ticker fetch failed — returning zeroed snapshot");
                MarketSnapshot::default()
            }
        }
    }
}

/// Deduplicate by `time` (last write wins) and sort ascending.
pub fn normalize_candles(raw: Vec<Candle>) -> Vec<Candle> {
    let mut by_time: BTreeMap<i64, Candle> = BTreeMap::new();
    for candle in raw {
        by_time.insert(candle.time, candle);
    }
    by_time.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`MarketSource`] shared by the market data and session tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// Scripted response for one `klines` call.
    pub enum Script {
        Candles(Vec<Candle>),
        Fail,
    }

    #[derive(Clone, Default)]
    pub struct FakeSource {
        inner: Arc<FakeInner>,
    }

    #[derive(Default)]
    struct FakeInner {
        scripts: Mutex<VecDeque<Script>>,
        fallback: Mutex<Vec<Candle>>,
        snapshot: Mutex<Option<MarketSnapshot>>,
        latency: Mutex<Duration>,
        calls: Mutex<Vec<(String, Interval, u32)>>,
        ticker_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Decrements the in-flight counter even when the fetch is cancelled.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for the next `klines` call.
        pub fn push(&self, script: Script) {
            self.inner.scripts.lock().push_back(script);
        }

        /// Response used once the queue is empty: the last `limit` candles.
        pub fn set_fallback(&self, candles: Vec<Candle>) {
            *self.inner.fallback.lock() = candles;
        }

        pub fn set_snapshot(&self, snapshot: Option<MarketSnapshot>) {
            *self.inner.snapshot.lock() = snapshot;
        }

        pub fn set_latency(&self, latency: Duration) {
            *self.inner.latency.lock() = latency;
        }

        pub fn calls(&self) -> Vec<(String, Interval, u32)> {
            self.inner.calls.lock().clone()
        }

        pub fn ticker_calls(&self) -> usize {
            self.inner.ticker_calls.load(Ordering::SeqCst)
        }

        /// Highest number of `klines` calls ever running at once.
        pub fn max_in_flight(&self) -> usize {
            self.inner.max_in_flight.load(Ordering::SeqCst)
        }
    }

    impl MarketSource for FakeSource {
        async fn klines(&self, symbol: &str, interval: Interval, limit: u32) -> Result<Vec<Candle>> {
            self.inner
                .calls
                .lock()
                .push((symbol.to_string(), interval, limit));
            let running = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.max_in_flight.fetch_max(running, Ordering::SeqCst);
            let _guard = InFlight(&self.inner.in_flight);

            let latency = *self.inner.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let script = self.inner.scripts.lock().pop_front();
            match script {
                Some(Script::Candles(candles)) => Ok(candles),
                Some(Script::Fail) => anyhow::bail!("scripted transport failure"),
                None => {
                    let fallback = self.inner.fallback.lock();
                    let start = fallback.len().saturating_sub(limit as usize);
                    Ok(fallback[start..].to_vec())
                }
            }
        }

        async fn ticker_24h(&self, _symbol: &str) -> Result<MarketSnapshot> {
            self.inner.ticker_calls.fetch_add(1, Ordering::SeqCst);
            match *self.inner.snapshot.lock() {
                Some(snapshot) => Ok(snapshot),
                None => anyhow::bail!("scripted ticker failure"),
            }
        }
    }
}
