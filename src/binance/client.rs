// =============================================================================
// Binance REST API Client — public market data
// =============================================================================
//
// Only the two unsigned endpoints the chart needs:
//   GET /api/v3/klines       — OHLCV candles
//   GET /api/v3/ticker/24hr  — rolling 24h ticker stats
//
// Errors are returned to the caller. The fail-closed policy lives one layer up
// in `market_data::MarketDataClient`.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::market_data::MarketSource;
use crate::types::{Candle, Interval, MarketSnapshot};

/// Minimum number of fields in a kline entry (open time .. volume).
const KLINE_MIN_FIELDS: usize = 6;

/// Binance public REST client.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient` against `base_url`
    /// (e.g. `https://api.binance.com`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines.
    ///
    /// Candles are returned in the order the exchange sent them; ordering and
    /// deduplication are the caller's concern.
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let body = self.get_json(&url, "GET /api/v3/klines").await?;
        let candles = parse_klines(&body)?;

        debug!(symbol, %interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /api/v3/ticker/24hr for a single symbol.
    #[instrument(skip(self), name = "binance::get_ticker_24h")]
    pub async fn get_ticker_24h(&self, symbol: &str) -> Result<MarketSnapshot> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol);

        let body = self.get_json(&url, "GET /api/v3/ticker/24hr").await?;
        let snapshot = parse_ticker(&body)?;

        debug!(symbol, price = snapshot.price, "24h ticker fetched");
        Ok(snapshot)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn get_json(&self, url: &str, endpoint: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("{endpoint} request failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {endpoint} response"))?;

        if !status.is_success() {
            anyhow::bail!("Binance {endpoint} returned {}: {}", status, body);
        }

        Ok(body)
    }
}

impl MarketSource for BinanceClient {
    async fn klines(&self, symbol: &str, interval: Interval, limit: u32) -> Result<Vec<Candle>> {
        self.get_klines(symbol, interval, limit).await
    }

    async fn ticker_24h(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.get_ticker_24h(symbol).await
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Payload parsing
// =============================================================================

/// Parse the klines array-of-arrays payload.
///
/// Array indices:
///   [0] openTime (ms), [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, ... (trailing fields are ignored)
///
/// Entries with too few fields are skipped; a non-numeric price fails the
/// whole payload.
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());

    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < KLINE_MIN_FIELDS {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time_ms = arr[0].as_i64().context("kline open time is not an integer")?;
        let open = parse_str_f64(&arr[1])?;
        let high = parse_str_f64(&arr[2])?;
        let low = parse_str_f64(&arr[3])?;
        let close = parse_str_f64(&arr[4])?;
        let volume = parse_str_f64(&arr[5])?;

        candles.push(Candle::new(open_time_ms / 1000, open, high, low, close, volume));
    }

    Ok(candles)
}

/// Parse the 24h ticker object.
pub fn parse_ticker(body: &serde_json::Value) -> Result<MarketSnapshot> {
    Ok(MarketSnapshot {
        price: parse_str_f64(&body["lastPrice"]).context("ticker lastPrice")?,
        volume_24h: parse_str_f64(&body["volume"]).context("ticker volume")?,
        price_change_24h: parse_str_f64(&body["priceChange"]).context("ticker priceChange")?,
        price_change_percentage_24h: parse_str_f64(&body["priceChangePercent"])
            .context("ticker priceChangePercent")?,
    })
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_klines_maps_millis_to_seconds() {
        let body = json!([
            [1700000000000_i64, "37000.00", "37050.00", "36990.00", "37020.00", "123.456",
             1700003599999_i64, "4567890.12", 1500, "60.123", "2224455.66", "0"],
            [1700003600000_i64, "37020.00", "37100.00", "37000.00", "37080.50", "98.7",
             1700007199999_i64, "1.0", 10, "1.0", "1.0", "0"]
        ]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_700_000_000);
        assert_eq!(candles[1].time, 1_700_003_600);
        assert!((candles[0].close - 37020.0).abs() < f64::EPSILON);
        assert!((candles[1].volume - 98.7).abs() < 1e-12);
    }

    #[test]
    fn parse_klines_accepts_numeric_fields() {
        let body = json!([[60_000, 1.0, 2.0, 0.5, 1.5, 10]]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles[0], Candle::new(60, 1.0, 2.0, 0.5, 1.5, 10.0));
    }

    #[test]
    fn parse_klines_skips_short_entries() {
        let body = json!([[60_000, "1", "2"], [120_000, "1", "2", "0.5", "1.5", "3"]]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].time, 120);
    }

    #[test]
    fn parse_klines_rejects_garbage() {
        assert!(parse_klines(&json!({"code": -1121, "msg": "Invalid symbol."})).is_err());
        assert!(parse_klines(&json!([[60_000, "abc", "2", "0.5", "1.5", "3"]])).is_err());
        assert!(parse_klines(&json!(["not-an-array"])).is_err());
    }

    #[test]
    fn parse_ticker_reads_string_fields() {
        let body = json!({
            "symbol": "BTCUSDT",
            "lastPrice": "64210.55",
            "volume": "18234.1",
            "priceChange": "-512.40",
            "priceChangePercent": "-0.792"
        });
        let snap = parse_ticker(&body).unwrap();
        assert!((snap.price - 64210.55).abs() < 1e-9);
        assert!((snap.volume_24h - 18234.1).abs() < 1e-9);
        assert!((snap.price_change_24h + 512.40).abs() < 1e-9);
        assert!((snap.price_change_percentage_24h + 0.792).abs() < 1e-9);
    }

    #[test]
    fn parse_ticker_missing_field_fails() {
        let body = json!({ "lastPrice": "1.0", "volume": "2.0" });
        assert!(parse_ticker(&body).is_err());
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = BinanceClient::new("https://api.binance.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "https://api.binance.com");
    }
}
