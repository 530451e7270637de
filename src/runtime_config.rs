// =============================================================================
// Runtime Configuration — chart feed settings with atomic save
// =============================================================================
//
// Every tunable of the chart engine lives here: the selectable pairs, the
// default session, fetch sizes, the live-tick delay and the indicator periods
// per interval class.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::DEFAULT_NUM_STD;
use crate::types::{Interval, IntervalClass};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "ADAUSDT".to_string(),
    ]
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_interval() -> Interval {
    Interval::OneHour
}

fn default_full_load_limit() -> u32 {
    500
}

fn default_live_tick_limit() -> u32 {
    1
}

fn default_tick_delay_ms() -> u64 {
    2_000
}

fn default_bollinger_k() -> f64 {
    DEFAULT_NUM_STD
}

fn default_api_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

// =============================================================================
// Indicator periods
// =============================================================================

/// Look-back periods for one interval class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    #[serde(default)]
    pub sma: Vec<usize>,
    #[serde(default)]
    pub rsi: Vec<usize>,
    pub bollinger: usize,
}

impl IndicatorPeriods {
    /// Sub-hour charts: shorter windows.
    pub fn intraday() -> Self {
        Self {
            sma: vec![5, 20, 100],
            rsi: vec![7, 14],
            bollinger: 20,
        }
    }

    /// Hour-and-above charts.
    pub fn extended() -> Self {
        Self {
            sma: vec![20, 50, 200],
            rsi: vec![14, 25],
            bollinger: 20,
        }
    }
}

/// Period sets keyed by [`IntervalClass`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodProfile {
    #[serde(default = "IndicatorPeriods::intraday")]
    pub intraday: IndicatorPeriods,
    #[serde(default = "IndicatorPeriods::extended")]
    pub extended: IndicatorPeriods,
}

impl Default for PeriodProfile {
    fn default() -> Self {
        Self {
            intraday: IndicatorPeriods::intraday(),
            extended: IndicatorPeriods::extended(),
        }
    }
}

impl PeriodProfile {
    pub fn for_interval(&self, interval: Interval) -> &IndicatorPeriods {
        match interval.class() {
            IntervalClass::Intraday => &self.intraday,
            IntervalClass::Extended => &self.extended,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the chart engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Selection ----------------------------------------------------------

    /// Pairs offered to the caller.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Pair the first session opens on.
    #[serde(default = "default_symbol")]
    pub default_symbol: String,

    /// Interval the first session opens on.
    #[serde(default = "default_interval")]
    pub default_interval: Interval,

    // --- Refresh ------------------------------------------------------------

    /// Candles requested by a full-load cycle.
    #[serde(default = "default_full_load_limit")]
    pub full_load_limit: u32,

    /// Candles requested by a live-tick cycle.
    #[serde(default = "default_live_tick_limit")]
    pub live_tick_limit: u32,

    /// Delay between the end of one cycle and the start of the next.
    #[serde(default = "default_tick_delay_ms")]
    pub tick_delay_ms: u64,

    // --- Indicators ---------------------------------------------------------

    /// Bollinger band width in standard deviations.
    #[serde(default = "default_bollinger_k")]
    pub bollinger_k: f64,

    #[serde(default)]
    pub periods: PeriodProfile,

    // --- Transport ----------------------------------------------------------

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            default_symbol: default_symbol(),
            default_interval: default_interval(),
            full_load_limit: default_full_load_limit(),
            live_tick_limit: default_live_tick_limit(),
            tick_delay_ms: default_tick_delay_ms(),
            bollinger_k: default_bollinger_k(),
            periods: PeriodProfile::default(),
            api_base_url: default_api_base_url(),
            bind_addr: default_bind_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            default_symbol = %config.default_symbol,
            default_interval = %config.default_interval,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `PULSE_*` environment overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(symbol) = std::env::var("PULSE_SYMBOL") {
            self.default_symbol = symbol.trim().to_uppercase();
        }
        if let Ok(interval) = std::env::var("PULSE_INTERVAL") {
            self.default_interval = interval
                .trim()
                .parse()
                .context("PULSE_INTERVAL is not a supported interval")?;
        }
        if let Ok(addr) = std::env::var("PULSE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(base) = std::env::var("PULSE_API_BASE") {
            self.api_base_url = base.trim_end_matches('/').to_string();
        }
        Ok(())
    }

    /// Whether `symbol` is one of the selectable pairs.
    pub fn is_known_symbol(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }

    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
