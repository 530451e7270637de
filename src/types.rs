// =============================================================================
// Shared types used across the Pulse chart engine
// =============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single OHLCV bar. `time` is the bucket open time in UNIX seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True when the bar closed at or above its open.
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// One value of a derived series, aligned to the time of its source candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: f64,
}

impl IndicatorPoint {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Point-in-time 24h ticker read. No history is kept; each fetch replaces the
/// previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: f64,
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub price_change_percentage_24h: f64,
}

impl MarketSnapshot {
    /// The zero-valued snapshot is what a failed fetch produces.
    pub fn is_unavailable(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// Intervals
// =============================================================================

/// Candle granularities accepted by the exchange's kline endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    TwelveHours,
    OneDay,
    OneWeek,
}

/// Coarse bucket used to pick default indicator periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalClass {
    /// Anything shorter than one hour.
    Intraday,
    /// One hour and above.
    Extended,
}

impl Interval {
    pub const ALL: [Interval; 12] = [
        Self::OneMinute,
        Self::ThreeMinutes,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::TwoHours,
        Self::FourHours,
        Self::SixHours,
        Self::TwelveHours,
        Self::OneDay,
        Self::OneWeek,
    ];

    /// Wire string, e.g. "1m", "4h".
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
        }
    }

    /// Bucket length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::ThreeMinutes => 3 * 60,
            Self::FiveMinutes => 5 * 60,
            Self::FifteenMinutes => 15 * 60,
            Self::ThirtyMinutes => 30 * 60,
            Self::OneHour => 3_600,
            Self::TwoHours => 2 * 3_600,
            Self::FourHours => 4 * 3_600,
            Self::SixHours => 6 * 3_600,
            Self::TwelveHours => 12 * 3_600,
            Self::OneDay => 86_400,
            Self::OneWeek => 7 * 86_400,
        }
    }

    pub fn class(&self) -> IntervalClass {
        if self.seconds() < 3_600 {
            IntervalClass::Intraday
        } else {
            IntervalClass::Extended
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|iv| iv.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unsupported interval '{s}'"))
    }
}

impl TryFrom<String> for Interval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

// =============================================================================
// Chart key
// =============================================================================

/// The (symbol, interval) pair that defines one chart session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChartKey {
    pub symbol: String,
    pub interval: Interval,
}

impl ChartKey {
    /// Build a key, normalising the symbol to the exchange's uppercase pair
    /// format. Rejects anything that is not plain alphanumeric.
    pub fn new(symbol: &str, interval: Interval) -> anyhow::Result<Self> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!("invalid trading pair '{symbol}'");
        }
        Ok(Self { symbol, interval })
    }
}

impl std::fmt::Display for ChartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}
