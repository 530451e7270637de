// =============================================================================
// Series Reconciler — decide what each refresh cycle changes on the chart
// =============================================================================
//
// Per series state machine:
//
//   EMPTY ──bulk replace──▶ LOADED ──incremental──▶ LIVE ⟲
//     ▲                                               │
//     └──────────── symbol / interval change ─────────┘
//
// Bulk replace rewrites every series and requests one auto-fit. Incremental
// update looks only at the newest point of each series:
//   newer time  => append
//   same time   => patch, only when a field differs
//   older time  => discard silently
// =============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::chart_frame::{ChartFrame, SeriesId, SeriesPoint};
use crate::types::ChartKey;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One instruction for the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SeriesDelta {
    /// Discard the series and draw `points` instead.
    ReplaceAll {
        series: SeriesId,
        points: Vec<SeriesPoint>,
    },
    /// Append `point`, or overwrite the last point when the times match.
    AppendOrUpdateLast { series: SeriesId, point: SeriesPoint },
    /// Scale the axes to show all data. Emitted once per bulk replace.
    FitContent,
}

impl SeriesDelta {
    #[cfg(test)]
    pub fn series(&self) -> Option<SeriesId> {
        match self {
            Self::ReplaceAll { series, .. } | Self::AppendOrUpdateLast { series, .. } => {
                Some(*series)
            }
            Self::FitContent => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-series state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SeriesPhase {
    #[default]
    Empty,
    Loaded,
    Live,
}

/// Last-rendered data for one series, at most `capacity` points.
#[derive(Debug, Clone)]
pub struct SeriesState {
    phase: SeriesPhase,
    points: Vec<SeriesPoint>,
    capacity: usize,
}

/// Result of offering one point to a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOutcome {
    Appended,
    Patched,
    Unchanged,
    Stale,
}

impl SeriesState {
    pub fn new(capacity: usize) -> Self {
        Self {
            phase: SeriesPhase::Empty,
            points: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn phase(&self) -> SeriesPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    fn load(points: Vec<SeriesPoint>, capacity: usize) -> Self {
        let mut state = Self::new(capacity);
        state.phase = SeriesPhase::Loaded;
        state.points = points;
        state.trim();
        state
    }

    /// Offer the newest point of a cycle to this series.
    pub fn offer(&mut self, point: SeriesPoint) -> PointOutcome {
        self.phase = SeriesPhase::Live;

        let outcome = match self.points.last_mut() {
            None => PointOutcome::Appended,
            Some(last) if point.time() > last.time() => PointOutcome::Appended,
            Some(last) if point.time() < last.time() => return PointOutcome::Stale,
            Some(last) if *last == point => return PointOutcome::Unchanged,
            Some(last) => {
                *last = point;
                return PointOutcome::Patched;
            }
        };

        self.points.push(point);
        self.trim();
        outcome
    }

    fn trim(&mut self) {
        if self.points.len() > self.capacity {
            let excess = self.points.len() - self.capacity;
            self.points.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Owns the state of every series of one chart session. Each series keeps
/// at most `capacity` points, matching the session's candle history.
#[derive(Debug)]
pub struct SeriesReconciler {
    loaded: Option<ChartKey>,
    series: BTreeMap<SeriesId, SeriesState>,
    capacity: usize,
}

impl SeriesReconciler {
    pub fn new(capacity: usize) -> Self {
        Self {
            loaded: None,
            series: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Key the current series were bulk-loaded for.
    #[cfg(test)]
    pub fn loaded_key(&self) -> Option<&ChartKey> {
        self.loaded.as_ref()
    }

    pub fn is_loaded_for(&self, key: &ChartKey) -> bool {
        self.loaded.as_ref() == Some(key)
    }

    #[cfg(test)]
    pub fn phase(&self, id: SeriesId) -> SeriesPhase {
        self.series.get(&id).map_or(SeriesPhase::Empty, SeriesState::phase)
    }

    #[cfg(test)]
    pub fn points(&self, id: SeriesId) -> &[SeriesPoint] {
        self.series.get(&id).map(SeriesState::points).unwrap_or(&[])
    }

    /// Forget everything; the next cycle for any key bulk-loads.
    pub fn reset(&mut self) {
        self.loaded = None;
        self.series.clear();
    }

    /// Bulk replace on first load or a key change, incremental otherwise.
    pub fn reconcile(&mut self, key: &ChartKey, frame: &ChartFrame) -> Vec<SeriesDelta> {
        if self.is_loaded_for(key) {
            self.apply_latest(frame)
        } else {
            self.bulk_replace(key, frame)
        }
    }

    /// Rewrite every series from `frame` and request an auto-fit.
    pub fn bulk_replace(&mut self, key: &ChartKey, frame: &ChartFrame) -> Vec<SeriesDelta> {
        self.series.clear();

        let mut deltas = Vec::new();
        for (id, points) in frame.iter() {
            self.series.insert(id, SeriesState::load(points.to_vec(), self.capacity));
            deltas.push(SeriesDelta::ReplaceAll {
                series: id,
                points: points.to_vec(),
            });
        }
        deltas.push(SeriesDelta::FitContent);

        debug!(
            key = %key,
            series = self.series.len(),
            candles = frame.get(SeriesId::Candles).map_or(0, <[SeriesPoint]>::len),
            "series bulk replaced"
        );
        self.loaded = Some(key.clone());
        deltas
    }

    /// Patch or append the newest point of each series in `frame`.
    ///
    /// A series without a value at the frame's newest time is skipped for
    /// this cycle.
    pub fn apply_latest(&mut self, frame: &ChartFrame) -> Vec<SeriesDelta> {
        let mut deltas = Vec::new();

        for (id, _) in frame.iter() {
            let Some(point) = frame.newest_point(id) else {
                trace!(series = %id, "no value at newest time, skipped");
                continue;
            };

            let capacity = self.capacity;
            let state = self
                .series
                .entry(id)
                .or_insert_with(|| SeriesState::new(capacity));
            if state.phase() == SeriesPhase::Loaded {
                debug!(series = %id, "series live");
            }
            match state.offer(point) {
                PointOutcome::Appended | PointOutcome::Patched => {
                    deltas.push(SeriesDelta::AppendOrUpdateLast { series: id, point });
                }
                PointOutcome::Unchanged => {
                    trace!(series = %id, time = point.time(), "point unchanged");
                }
                PointOutcome::Stale => {
                    trace!(series = %id, time = point.time(), "stale point discarded");
                }
            }
        }

        deltas
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
