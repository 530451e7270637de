// =============================================================================
// Central Application State — Pulse Chart
// =============================================================================
//
// Ties the running chart session to the HTTP/WebSocket surface. The session
// task owns all series state; AppState only holds the consumer-side view
// built from the session's update stream, plus a fan-out of that stream for
// WebSocket clients.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for the config, the view and the session control.
//     No lock is ever held across an `.await`.
//   - tokio broadcast channel for live update fan-out.
// =============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::runtime_config::RuntimeConfig;
use crate::session::{SessionControl, SessionUpdate};
use crate::types::{ChartKey, Interval};
use crate::view::{ChartView, ViewPayload};

/// Updates buffered per WebSocket subscriber before it is considered lagging.
const UPDATE_FANOUT_CAPACITY: usize = 256;

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Monotonically increasing version counter. Incremented whenever the
    /// view changes.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: RwLock<RuntimeConfig>,
    pub config_path: PathBuf,

    // ── Chart ───────────────────────────────────────────────────────────
    pub view: RwLock<ChartView>,
    session: RwLock<Option<SessionControl>>,
    updates: broadcast::Sender<SessionUpdate>,

    // ── Timing ──────────────────────────────────────────────────────────
    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, config_path: impl Into<PathBuf>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_FANOUT_CAPACITY);
        let view = ChartView::new(config.full_load_limit as usize);

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: RwLock::new(config),
            config_path: config_path.into(),
            view: RwLock::new(view),
            session: RwLock::new(None),
            updates,
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Atomically increment the state version.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current state version without modifying it.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Session ─────────────────────────────────────────────────────────

    pub fn attach_session(&self, control: SessionControl) {
        info!(session = %control.id(), "chart session attached");
        *self.session.write() = Some(control);
        self.increment_version();
    }

    pub fn session(&self) -> Option<SessionControl> {
        self.session.read().clone()
    }

    /// Validate `symbol`/`interval` against the config, falling back to the
    /// current selection for whichever is absent.
    pub fn resolve_key(&self, symbol: Option<&str>, interval: Option<Interval>) -> Result<ChartKey> {
        let config = self.runtime_config.read();
        let current = self.view.read().key().cloned();

        let symbol = match symbol {
            Some(s) => s.to_string(),
            None => current
                .as_ref()
                .map_or_else(|| config.default_symbol.clone(), |k| k.symbol.clone()),
        };
        let interval = interval
            .or(current.as_ref().map(|k| k.interval))
            .unwrap_or(config.default_interval);

        let key = ChartKey::new(&symbol, interval)?;
        if !config.is_known_symbol(&key.symbol) {
            anyhow::bail!("symbol {} is not one of the selectable pairs", key.symbol);
        }
        Ok(key)
    }

    /// Retarget the running session and remember the selection in the config.
    pub async fn switch_session(&self, key: ChartKey) -> Result<()> {
        let control = self.session().context("no chart session is running")?;
        control.switch(key.clone()).await?;

        {
            let mut config = self.runtime_config.write();
            config.default_symbol = key.symbol.clone();
            config.default_interval = key.interval;
        }
        info!(key = %key, "chart session switch requested");
        self.increment_version();
        Ok(())
    }

    // ── Update stream ───────────────────────────────────────────────────

    /// Fold a session update into the view and fan it out to subscribers.
    ///
    /// The broadcast happens under the view's write lock, so a subscriber
    /// taken with [`AppState::subscribe_with_snapshot`] sees each update
    /// either in its snapshot or on its receiver, never both.
    pub fn apply_update(&self, update: SessionUpdate) {
        let mut view = self.view.write();
        if !view.apply(&update) {
            return;
        }
        self.increment_version();
        if self.updates.send(update).is_err() {
            debug!("no WebSocket subscribers for update");
        }
    }

    /// Current state plus a receiver for every update applied after it.
    pub fn subscribe_with_snapshot(&self) -> (StateSnapshot, broadcast::Receiver<SessionUpdate>) {
        let view = self.view.read();
        let updates = self.updates.subscribe();
        (self.snapshot_of(&view), updates)
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Payload of `GET /api/v1/state` and the WebSocket greeting.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let view = self.view.read();
        self.snapshot_of(&view)
    }

    fn snapshot_of(&self, view: &ChartView) -> StateSnapshot {
        let active = self.session().is_some_and(|s| s.is_active());
        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            active,
            view: view.payload(),
        }
    }
}

/// Full chart state as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub active: bool,
    #[serde(flatten)]
    pub view: ViewPayload,
}
