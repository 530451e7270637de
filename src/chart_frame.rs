// =============================================================================
// Chart Frame — every rendered line derived from one candle history
// =============================================================================
//
// A frame is rebuilt from scratch on every refresh cycle. It owns no state
// between cycles; the reconciler decides what part of it reaches the chart.
// =============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::indicators::{calculate_bollinger, calculate_rsi, calculate_sma};
use crate::runtime_config::IndicatorPeriods;
use crate::types::{Candle, IndicatorPoint};

/// Volume bar color for a candle that closed at or above its open.
pub const VOLUME_UP_COLOR: &str = "#26a69a";
/// Volume bar color for a candle that closed below its open.
pub const VOLUME_DOWN_COLOR: &str = "#ef5350";

/// Identifies one line on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "period", rename_all = "snake_case")]
pub enum SeriesId {
    Candles,
    Volume,
    Sma(usize),
    Rsi(usize),
    BollingerUpper(usize),
    BollingerMiddle(usize),
    BollingerLower(usize),
}

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candles => write!(f, "candles"),
            Self::Volume => write!(f, "volume"),
            Self::Sma(p) => write!(f, "sma{p}"),
            Self::Rsi(p) => write!(f, "rsi{p}"),
            Self::BollingerUpper(p) => write!(f, "bb{p}.upper"),
            Self::BollingerMiddle(p) => write!(f, "bb{p}.middle"),
            Self::BollingerLower(p) => write!(f, "bb{p}.lower"),
        }
    }
}

/// One point in the shape the rendering surface consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesPoint {
    Candle {
        time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
    Bar {
        time: i64,
        value: f64,
        color: &'static str,
    },
    Line {
        time: i64,
        value: f64,
    },
}

impl SeriesPoint {
    pub fn time(&self) -> i64 {
        match *self {
            Self::Candle { time, .. } | Self::Bar { time, .. } | Self::Line { time, .. } => time,
        }
    }

    pub fn candle(c: &Candle) -> Self {
        Self::Candle {
            time: c.time,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
        }
    }

    pub fn volume(c: &Candle) -> Self {
        Self::Bar {
            time: c.time,
            value: c.volume,
            color: if c.is_up() {
                VOLUME_UP_COLOR
            } else {
                VOLUME_DOWN_COLOR
            },
        }
    }

    pub fn line(p: &IndicatorPoint) -> Self {
        Self::Line {
            time: p.time,
            value: p.value,
        }
    }
}

/// All series computed for one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartFrame {
    series: BTreeMap<SeriesId, Vec<SeriesPoint>>,
    newest_time: Option<i64>,
}

impl ChartFrame {
    /// Derive candles, volume and every configured indicator line from
    /// `candles` (ascending, unique by time).
    pub fn build(candles: &[Candle], periods: &IndicatorPeriods, num_std: f64) -> Self {
        let mut series = BTreeMap::new();

        series.insert(
            SeriesId::Candles,
            candles.iter().map(SeriesPoint::candle).collect(),
        );
        series.insert(
            SeriesId::Volume,
            candles.iter().map(SeriesPoint::volume).collect(),
        );

        for &period in &periods.sma {
            series.insert(SeriesId::Sma(period), lines(&calculate_sma(candles, period)));
        }
        for &period in &periods.rsi {
            series.insert(SeriesId::Rsi(period), lines(&calculate_rsi(candles, period)));
        }

        let bb_period = periods.bollinger;
        let bands = calculate_bollinger(candles, bb_period, num_std);
        series.insert(SeriesId::BollingerUpper(bb_period), lines(&bands.upper));
        series.insert(SeriesId::BollingerMiddle(bb_period), lines(&bands.middle));
        series.insert(SeriesId::BollingerLower(bb_period), lines(&bands.lower));

        Self {
            series,
            newest_time: candles.last().map(|c| c.time),
        }
    }

    /// Time of the newest candle in the frame.
    #[cfg(test)]
    pub fn newest_time(&self) -> Option<i64> {
        self.newest_time
    }

    pub fn get(&self, id: SeriesId) -> Option<&[SeriesPoint]> {
        self.series.get(&id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeriesId, &[SeriesPoint])> {
        self.series.iter().map(|(id, points)| (*id, points.as_slice()))
    }

    /// Newest point of `id`, only if it sits on the newest candle's time.
    pub fn newest_point(&self, id: SeriesId) -> Option<SeriesPoint> {
        let newest = self.newest_time?;
        self.series
            .get(&id)?
            .last()
            .copied()
            .filter(|p| p.time() == newest)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.newest_time.is_none()
    }
}

fn lines(points: &[IndicatorPoint]) -> Vec<SeriesPoint> {
    points.iter().map(SeriesPoint::line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periods() -> IndicatorPeriods {
        IndicatorPeriods {
            sma: vec![3, 10],
            rsi: vec![3],
            bollinger: 3,
        }
    }

    fn rising(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                Candle::new(i * 60, c - 0.5, c + 1.0, c - 1.0, c, 10.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn frame_contains_every_configured_line() {
        let frame = ChartFrame::build(&rising(5), &periods(), 2.0);
        let ids: Vec<SeriesId> = frame.iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec![
                SeriesId::Candles,
                SeriesId::Volume,
                SeriesId::Sma(3),
                SeriesId::Sma(10),
                SeriesId::Rsi(3),
                SeriesId::BollingerUpper(3),
                SeriesId::BollingerMiddle(3),
                SeriesId::BollingerLower(3),
            ]
        );
        assert_eq!(frame.get(SeriesId::Candles).unwrap().len(), 5);
        assert_eq!(frame.get(SeriesId::Sma(3)).unwrap().len(), 3);
        assert_eq!(frame.get(SeriesId::Rsi(3)).unwrap().len(), 2);
        assert!(frame.get(SeriesId::Sma(10)).unwrap().is_empty());
    }

    #[test]
    fn volume_bars_colored_by_direction() {
        let candles = vec![
            Candle::new(0, 10.0, 11.0, 9.0, 10.5, 5.0),
            Candle::new(60, 10.5, 11.0, 9.0, 9.5, 6.0),
            Candle::new(120, 9.5, 9.5, 9.5, 9.5, 7.0),
        ];
        let frame = ChartFrame::build(&candles, &periods(), 2.0);
        let colors: Vec<&str> = frame
            .get(SeriesId::Volume)
            .unwrap()
            .iter()
            .map(|p| match p {
                SeriesPoint::Bar { color, .. } => *color,
                _ => panic!("volume series must hold bars"),
            })
            .collect();
        assert_eq!(colors, vec![VOLUME_UP_COLOR, VOLUME_DOWN_COLOR, VOLUME_UP_COLOR]);
    }

    #[test]
    fn newest_point_requires_alignment() {
        let frame = ChartFrame::build(&rising(5), &periods(), 2.0);
        assert_eq!(frame.newest_time(), Some(240));
        assert_eq!(frame.newest_point(SeriesId::Sma(3)).map(|p| p.time()), Some(240));
        assert!(frame.newest_point(SeriesId::Sma(10)).is_none());
    }

    #[test]
    fn empty_history_builds_empty_frame() {
        let frame = ChartFrame::build(&[], &periods(), 2.0);
        assert!(frame.is_empty());
        assert!(frame.newest_point(SeriesId::Candles).is_none());
    }

    #[test]
    fn points_serialise_in_surface_shape() {
        let candle = SeriesPoint::candle(&Candle::new(60, 1.0, 2.0, 0.5, 1.5, 3.0));
        assert_eq!(
            serde_json::to_value(candle).unwrap(),
            serde_json::json!({"time": 60, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5})
        );
        let line = SeriesPoint::line(&IndicatorPoint::new(60, 42.0));
        assert_eq!(
            serde_json::to_value(line).unwrap(),
            serde_json::json!({"time": 60, "value": 42.0})
        );
        assert_eq!(
            serde_json::to_value(SeriesId::Sma(20)).unwrap(),
            serde_json::json!({"kind": "sma", "period": 20})
        );
    }
}
