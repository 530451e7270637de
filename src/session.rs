// =============================================================================
// Chart Session — refresh scheduler for one (symbol, interval) pair
// =============================================================================
//
// One tokio task per session. Cycles are strictly sequential:
//
//   full load (limit = full_load_limit)
//     └─▶ wait tick_delay ─▶ live tick (limit = live_tick_limit) ─▶ wait ...
//
// The next cycle is scheduled only after the previous one has been applied.
// A switch command cancels the pending wait (or the in-flight fetch) and
// restarts from a full load against the new key. Deactivation clears the
// `active` flag; a fetch that completes afterwards is discarded unapplied.
//
// Results leave the task as `SessionUpdate`s on an mpsc channel. Whatever
// renders the chart subscribes to that channel.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::chart_frame::ChartFrame;
use crate::indicators::signals::IndicatorSummary;
use crate::market_data::{CandleHistory, MarketDataClient, MarketSource};
use crate::reconcile::{SeriesDelta, SeriesReconciler};
use crate::runtime_config::{PeriodProfile, RuntimeConfig};
use crate::types::{Candle, ChartKey, MarketSnapshot};

/// Capacity of the command channel into a session task.
const COMMAND_BUFFER: usize = 8;

// =============================================================================
// Settings & messages
// =============================================================================

/// Scheduler knobs, taken from [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub full_load_limit: u32,
    pub live_tick_limit: u32,
    pub tick_delay: Duration,
    pub periods: PeriodProfile,
    pub bollinger_k: f64,
}

impl From<&RuntimeConfig> for SessionSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            full_load_limit: config.full_load_limit,
            live_tick_limit: config.live_tick_limit,
            tick_delay: config.tick_delay(),
            periods: config.periods.clone(),
            bollinger_k: config.bollinger_k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    FullLoad,
    LiveTick,
}

/// What one session reports to its consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session now targets a new key; previous series are void.
    Reset,
    Series { deltas: Vec<SeriesDelta> },
    Market { snapshot: MarketSnapshot },
    Summary { summary: IndicatorSummary },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub session: Uuid,
    pub key: ChartKey,
    #[serde(flatten)]
    pub event: SessionEvent,
}

#[derive(Debug)]
enum SessionCommand {
    Switch(ChartKey),
    Stop,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable control surface of a running session.
#[derive(Debug, Clone)]
pub struct SessionControl {
    id: Uuid,
    active: Arc<AtomicBool>,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionControl {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.commands.is_closed()
    }

    /// Retarget the session. Cancels the pending timer and restarts with a
    /// full load.
    pub async fn switch(&self, key: ChartKey) -> Result<()> {
        self.commands
            .send(SessionCommand::Switch(key))
            .await
            .context("chart session is no longer running")
    }

    /// Stop scheduling. Any cycle still in flight is discarded on arrival.
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!(session = %self.id, "chart session deactivated");
        }
        let _ = self.commands.try_send(SessionCommand::Stop);
    }
}

/// Owner-side handle of a running session task.
#[derive(Debug)]
pub struct SessionHandle {
    control: SessionControl,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Start a session for `key`. Updates are delivered on `updates`.
    pub fn spawn<S: MarketSource>(
        client: Arc<MarketDataClient<S>>,
        key: ChartKey,
        settings: SessionSettings,
        updates: mpsc::Sender<SessionUpdate>,
    ) -> Self {
        let id = Uuid::new_v4();
        let active = Arc::new(AtomicBool::new(true));
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let capacity = settings.full_load_limit as usize;
        let session = ChartSession {
            id,
            history: CandleHistory::new(capacity),
            reconciler: SeriesReconciler::new(capacity),
            key,
            settings,
            client,
            active: active.clone(),
            updates,
            commands: command_rx,
        };
        let task = tokio::spawn(session.run());

        Self {
            control: SessionControl {
                id,
                active,
                commands,
            },
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.control.id
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.control.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    #[cfg(test)]
    pub async fn switch(&self, key: ChartKey) -> Result<()> {
        self.control.switch(key).await
    }

    #[cfg(test)]
    pub fn deactivate(&self) {
        self.control.deactivate();
    }

    /// Deactivate and wait for the task to exit.
    pub async fn shutdown(self) {
        self.control.deactivate();
        let id = self.control.id;
        if let Err(e) = self.task.await {
            warn!(session = %id, error = %e, "chart session task ended abnormally");
        }
    }
}

// =============================================================================
// Session task
// =============================================================================

struct ChartSession<S> {
    id: Uuid,
    key: ChartKey,
    settings: SessionSettings,
    client: Arc<MarketDataClient<S>>,
    history: CandleHistory,
    reconciler: SeriesReconciler,
    active: Arc<AtomicBool>,
    updates: mpsc::Sender<SessionUpdate>,
    commands: mpsc::Receiver<SessionCommand>,
}

enum Step {
    Fetched(Vec<Candle>, MarketSnapshot),
    Elapsed,
    Command(Option<SessionCommand>),
}

impl<S: MarketSource> ChartSession<S> {
    async fn run(mut self) {
        info!(session = %self.id, key = %self.key, "chart session started");

        while self.is_active() {
            // ── Fetch ───────────────────────────────────────────────────
            let kind = self.next_cycle_kind();
            let limit = match kind {
                CycleKind::FullLoad => self.settings.full_load_limit,
                CycleKind::LiveTick => self.settings.live_tick_limit,
            };
            let key = self.key.clone();

            let step = tokio::select! {
                (candles, snapshot) = fetch_cycle(&self.client, &key, limit) => {
                    Step::Fetched(candles, snapshot)
                }
                cmd = self.commands.recv() => Step::Command(cmd),
            };

            match step {
                Step::Fetched(candles, snapshot) => {
                    if !self.is_active() {
                        debug!(session = %self.id, key = %key, "in-flight cycle discarded after deactivation");
                        break;
                    }
                    if !self.apply_cycle(kind, candles, snapshot).await {
                        break;
                    }
                }
                Step::Command(cmd) => {
                    // The in-flight fetch was dropped; restart immediately.
                    if !self.handle_command(cmd).await {
                        break;
                    }
                    continue;
                }
                Step::Elapsed => {}
            }

            // ── Wait ────────────────────────────────────────────────────
            let step = tokio::select! {
                _ = tokio::time::sleep(self.settings.tick_delay) => Step::Elapsed,
                cmd = self.commands.recv() => Step::Command(cmd),
            };
            if let Step::Command(cmd) = step {
                if !self.handle_command(cmd).await {
                    break;
                }
            }
        }

        self.active.store(false, Ordering::SeqCst);
        info!(session = %self.id, key = %self.key, "chart session stopped");
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn next_cycle_kind(&self) -> CycleKind {
        if self.reconciler.is_loaded_for(&self.key) {
            CycleKind::LiveTick
        } else {
            CycleKind::FullLoad
        }
    }

    /// Returns `false` when the session must stop.
    async fn handle_command(&mut self, cmd: Option<SessionCommand>) -> bool {
        match cmd {
            Some(SessionCommand::Switch(key)) => {
                if key == self.key {
                    trace!(session = %self.id, key = %key, "switch to current key ignored");
                    return true;
                }
                info!(session = %self.id, from = %self.key, to = %key, "chart session switched");
                self.key = key;
                self.reconciler.reset();
                self.history.clear();
                self.emit(SessionEvent::Reset).await
            }
            Some(SessionCommand::Stop) | None => false,
        }
    }

    /// Feed one cycle's results through history, indicators and the
    /// reconciler. Returns `false` when the consumer has gone away.
    async fn apply_cycle(&mut self, kind: CycleKind, candles: Vec<Candle>, snapshot: MarketSnapshot) -> bool {
        if !snapshot.is_unavailable() && !self.emit(SessionEvent::Market { snapshot }).await {
            return false;
        }

        if candles.is_empty() {
            debug!(session = %self.id, key = %self.key, ?kind, "cycle produced no candles");
            return true;
        }

        match kind {
            CycleKind::FullLoad => self.history.replace(candles),
            CycleKind::LiveTick => {
                let outcome = self.history.merge(&candles);
                trace!(
                    session = %self.id,
                    appended = outcome.appended,
                    replaced = outcome.replaced,
                    dropped = outcome.dropped,
                    "live candles merged"
                );
                if !outcome.changed() {
                    return true;
                }
            }
        }

        let periods = self.settings.periods.for_interval(self.key.interval);
        let frame = ChartFrame::build(self.history.as_slice(), periods, self.settings.bollinger_k);
        let deltas = self.reconciler.reconcile(&self.key, &frame);

        if deltas.is_empty() {
            return true;
        }

        debug!(session = %self.id, key = %self.key, ?kind, deltas = deltas.len(), "series updated");
        let summary = IndicatorSummary::compute(
            self.history.as_slice(),
            periods,
            self.settings.bollinger_k,
        );

        self.emit(SessionEvent::Series { deltas }).await
            && self.emit(SessionEvent::Summary { summary }).await
    }

    async fn emit(&self, event: SessionEvent) -> bool {
        let update = SessionUpdate {
            session: self.id,
            key: self.key.clone(),
            event,
        };
        if self.updates.send(update).await.is_err() {
            debug!(session = %self.id, "update receiver dropped, stopping session");
            return false;
        }
        true
    }
}

/// One fetch round: candles first, then the ticker.
async fn fetch_cycle<S: MarketSource>(
    client: &MarketDataClient<S>,
    key: &ChartKey,
    limit: u32,
) -> (Vec<Candle>, MarketSnapshot) {
    let candles = client.fetch_candles(&key.symbol, key.interval, limit).await;
    let snapshot = client.fetch_snapshot(&key.symbol).await;
    (candles, snapshot)
}
