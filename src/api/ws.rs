// =============================================================================
// WebSocket Handler — push-based chart updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full chart view on connect (`"type": "view"`).
//   2. Every session update as it is applied (`"type": "series" | "market" |
//      "summary" | "reset"`), in order.
//
// A client that falls behind the fan-out buffer is resynchronised with a
// fresh full view instead of being disconnected.
//
// The handler also responds to Ping frames with Pong frames and cleans up on
// disconnect.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app_state::{AppState, StateSnapshot};

/// Outbound frame carrying the full view.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Greeting<'a> {
    View(&'a StateSnapshot),
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// Runs two concurrent branches via `tokio::select!`:
///   1. **Push** — forward each broadcast session update.
///   2. **Recv** — process incoming client messages (Ping/Pong, Close).
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // The receiver starts exactly after the updates folded into the view.
    let (snapshot, mut updates) = state.subscribe_with_snapshot();
    let mut sequence: u64 = 0;

    if let Err(e) = send_view(&mut sender, &state, &snapshot, &mut sequence).await {
        warn!(error = %e, "Failed to send initial WebSocket view");
        return;
    }

    loop {
        tokio::select! {
            // ── Push: forward applied session updates ────────────────────
            update = updates.recv() => {
                let sent = match update {
                    Ok(update) => send_json(&mut sender, &state, &update, &mut sequence).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagged — resending full view");
                        let (snapshot, fresh) = state.subscribe_with_snapshot();
                        updates = fresh;
                        send_view(&mut sender, &state, &snapshot, &mut sequence).await
                    }
                    Err(RecvError::Closed) => {
                        info!("update stream closed — disconnecting");
                        break;
                    }
                };
                if let Err(e) = sent {
                    debug!(error = %e, "WebSocket send failed — disconnecting");
                    break;
                }
            }

            // ── Recv: process incoming messages ──────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(msg = %text, "WebSocket text message ignored");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("WebSocket Ping received — sending Pong");
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("WebSocket Pong received");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received — disconnecting");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("WebSocket binary message ignored");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended (None)");
                        break;
                    }
                }
            }
        }
    }

    info!(sent = sequence, "WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

async fn send_view<S>(
    sender: &mut S,
    state: &Arc<AppState>,
    snapshot: &StateSnapshot,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    send_json(sender, state, &Greeting::View(snapshot), sequence).await
}

/// Serialize and send one JSON frame, counting it in both the connection's
/// and the global sequence numbers.
async fn send_json<S, T>(
    sender: &mut S,
    state: &Arc<AppState>,
    payload: &T,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    match serde_json::to_string(payload) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            state.ws_sequence_number.fetch_add(1, Ordering::Relaxed);
            *sequence += 1;
            debug!(seq = *sequence, "WebSocket frame sent");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket frame");
            // Serialisation errors are not network errors; don't disconnect.
            Ok(())
        }
    }
}
