// =============================================================================
// Chart View — the consumer side of a session's update stream
// =============================================================================
//
// Mirrors what a rendering surface holds after applying every delta it has
// received: the points of each series, the last good market snapshot and the
// latest indicator summary. `GET /api/v1/state` and the WebSocket greeting
// serve this view so a late joiner starts from the same picture as a client
// that has been connected since the first load.
// =============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;
use uuid::Uuid;

use crate::chart_frame::{SeriesId, SeriesPoint};
use crate::indicators::signals::IndicatorSummary;
use crate::reconcile::SeriesDelta;
use crate::session::{SessionEvent, SessionUpdate};
use crate::types::{ChartKey, MarketSnapshot};

/// Each series keeps at most `capacity` points, like the session's history.
#[derive(Debug, Clone)]
pub struct ChartView {
    session: Option<Uuid>,
    key: Option<ChartKey>,
    series: BTreeMap<SeriesId, Vec<SeriesPoint>>,
    snapshot: Option<MarketSnapshot>,
    summary: Option<IndicatorSummary>,
    fit_generation: u64,
    capacity: usize,
}

/// Serialisable form of a [`ChartView`].
#[derive(Debug, Clone, Serialize)]
pub struct ViewPayload {
    pub session: Option<Uuid>,
    pub key: Option<ChartKey>,
    pub series: Vec<SeriesPayload>,
    /// `None` until a valid ticker has arrived.
    pub snapshot: Option<MarketSnapshot>,
    /// `None` until the first candles have arrived.
    pub summary: Option<IndicatorSummary>,
    /// Bumped on every auto-fit request; clients refit when it changes.
    pub fit_generation: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPayload {
    pub id: SeriesId,
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl ChartView {
    pub fn new(capacity: usize) -> Self {
        Self {
            session: None,
            key: None,
            series: BTreeMap::new(),
            snapshot: None,
            summary: None,
            fit_generation: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn key(&self) -> Option<&ChartKey> {
        self.key.as_ref()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<&MarketSnapshot> {
        self.snapshot.as_ref()
    }

    #[cfg(test)]
    pub fn series(&self, id: SeriesId) -> &[SeriesPoint] {
        self.series.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[cfg(test)]
    pub fn fit_generation(&self) -> u64 {
        self.fit_generation
    }

    /// Fold one session update into the view. Returns whether anything
    /// visible changed.
    pub fn apply(&mut self, update: &SessionUpdate) -> bool {
        if self.session != Some(update.session) || self.key.as_ref() != Some(&update.key) {
            // Another session or key: nothing held so far belongs to it.
            self.clear();
            self.session = Some(update.session);
            self.key = Some(update.key.clone());
        }

        match &update.event {
            SessionEvent::Reset => true,
            SessionEvent::Series { deltas } => {
                deltas.iter().fold(false, |changed, delta| self.apply_delta(delta) || changed)
            }
            SessionEvent::Market { snapshot } => {
                if snapshot.is_unavailable() {
                    trace!("unavailable snapshot ignored, keeping last good values");
                    return false;
                }
                let changed = self.snapshot.as_ref() != Some(snapshot);
                self.snapshot = Some(*snapshot);
                changed
            }
            SessionEvent::Summary { summary } => {
                let changed = self.summary.as_ref() != Some(summary);
                self.summary = Some(summary.clone());
                changed
            }
        }
    }

    fn apply_delta(&mut self, delta: &SeriesDelta) -> bool {
        match delta {
            SeriesDelta::ReplaceAll { series, points } => {
                let start = points.len().saturating_sub(self.capacity);
                self.series.insert(*series, points[start..].to_vec());
                true
            }
            SeriesDelta::AppendOrUpdateLast { series, point } => {
                let capacity = self.capacity;
                let points = self.series.entry(*series).or_default();
                match points.last().map(SeriesPoint::time) {
                    Some(newest) if newest == point.time() => {
                        let Some(last) = points.last_mut() else {
                            return false;
                        };
                        let changed = last != point;
                        *last = *point;
                        changed
                    }
                    Some(newest) if newest > point.time() => false,
                    _ => {
                        points.push(*point);
                        if points.len() > capacity {
                            let excess = points.len() - capacity;
                            points.drain(..excess);
                        }
                        true
                    }
                }
            }
            SeriesDelta::FitContent => {
                self.fit_generation += 1;
                true
            }
        }
    }

    fn clear(&mut self) {
        self.series.clear();
        self.snapshot = None;
        self.summary = None;
    }

    pub fn payload(&self) -> ViewPayload {
        ViewPayload {
            session: self.session,
            key: self.key.clone(),
            series: self
                .series
                .iter()
                .map(|(id, points)| SeriesPayload {
                    id: *id,
                    name: id.to_string(),
                    points: points.clone(),
                })
                .collect(),
            snapshot: self.snapshot,
            summary: self.summary.clone(),
            fit_generation: self.fit_generation,
        }
    }
}
