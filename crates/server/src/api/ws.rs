//! WebSocket support for real-time queue updates.
//!
//! Clients subscribe to a scope's public feed and, by passing their
//! `ticket_id`, also to the private feed where admission credentials
//! are delivered. The first frame is always a stamped snapshot; every
//! later frame carries the scope sequence number, so a client that
//! sees a gap in `seq` re-fetches a snapshot instead of trusting its
//! incremental view.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use anteroom_core::{Envelope, ScopeId};

use super::error::bad_request;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Also subscribe to this ticket's private feed.
    pub ticket_id: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((show_id, sched_id)): Path<(String, String)>,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let scope = match ScopeId::new(&show_id, &sched_id) {
        Ok(scope) => scope,
        Err(e) => return bad_request(e.to_string()),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, scope, params.ticket_id))
        .into_response()
}

/// Handle a single WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    scope: ScopeId,
    ticket_id: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no event between the two is lost.
    let mut public_rx = state.notifier().subscribe_public(&scope);
    let mut private_rx = ticket_id
        .as_deref()
        .map(|tid| state.notifier().subscribe_ticket(&scope, tid));

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!(%scope, ticket_id = ?ticket_id, "WebSocket client connected");

    // First frame: a stamped snapshot of the scope.
    match state.manager().stamped_snapshot(&scope) {
        Ok((seq, event)) => {
            let envelope = Envelope {
                scope: scope.clone(),
                seq,
                event,
            };
            if send_envelope(&mut sender, &envelope).await.is_err() {
                WS_CONNECTIONS_ACTIVE.dec();
                return;
            }
        }
        Err(e) => {
            error!(%scope, "failed to build snapshot: {}", e);
            WS_CONNECTIONS_ACTIVE.dec();
            return;
        }
    }

    // Spawn task to forward broadcast events to this client
    let send_task = tokio::spawn(async move {
        loop {
            let result = tokio::select! {
                result = public_rx.recv() => result,
                result = async {
                    match private_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => result,
            };

            match result {
                Ok(envelope) => {
                    if send_envelope(&mut sender, &envelope).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // The client sees the seq gap and resyncs from a snapshot.
                    warn!("WebSocket client lagged, skipped {} events", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // Scope closed; the queue_closed frame already went out.
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                // We don't expect any client messages, but log them
                debug!("Received text message: {}", text);
            }
            Ok(_) => {
                // Ignore other message types
            }
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

async fn send_envelope(
    sender: &mut (impl SinkExt<Message> + Unpin),
    envelope: &Envelope,
) -> Result<(), ()> {
    WS_MESSAGES_SENT
        .with_label_values(&[envelope.event.kind()])
        .inc();

    match serde_json::to_string(envelope) {
        Ok(json) => sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ()),
        Err(e) => {
            error!("Failed to serialize envelope: {}", e);
            Ok(())
        }
    }
}
