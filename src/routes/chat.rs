//! Chat websocket: bridges one browser tab to the user's chat session.
//!
//! DESIGN
//! ======
//! The browser never talks to the broker. On upgrade the socket attaches a
//! view to the user's session in the hub and enters a `select!` loop:
//! - inbound JSON commands (`send`, `switch_room`, `snapshot`) act on the session
//! - session events are forwarded verbatim as JSON
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade with `?room=<cached id>` from browser storage
//! 2. Attach view, then send a `snapshot` (room, transcript, connection)
//! 3. Relay commands and events until either side closes
//! 4. Drop the view; the last view for a user releases the session

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::backend::types::Profile;
use crate::chat::message::RoomId;
use crate::chat::projector::TranscriptEntry;
use crate::chat::room::ROOM_STORAGE_KEY;
use crate::chat::session::{ChatError, ChatIdentity, ChatSession};
use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

// =============================================================================
// FRAMES
// =============================================================================

/// Commands a browser may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Send { content: String },
    SwitchRoom { room_id: String },
    Snapshot,
}

/// Frames produced by the bridge itself, next to forwarded session events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    Snapshot {
        connected: bool,
        room_id: Option<RoomId>,
        storage_key: &'static str,
        transcript: Vec<TranscriptEntry>,
    },
    /// The send did not go out; `draft` goes back into the input box.
    SendFailed { draft: String, code: &'static str, message: String },
    Error { code: &'static str, message: String },
}

impl BridgeFrame {
    #[must_use]
    pub fn snapshot(session: &ChatSession) -> Self {
        Self::Snapshot {
            connected: session.is_connected(),
            room_id: session.room(),
            storage_key: ROOM_STORAGE_KEY,
            transcript: session.transcript(),
        }
    }

    fn error(err: &ChatError) -> Self {
        Self::Error { code: err.error_code(), message: err.to_string() }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ChatWsQuery {
    pub room: Option<String>,
}

/// `GET /api/chat/ws`
pub async fn handle_ws(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ChatWsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let profile: Profile = state.backend.fetch("/users/me", Some(&auth.token)).await?;
    let identity = ChatIdentity { user_id: profile.id, token: auth.token };
    let cached = params.room.as_deref().and_then(RoomId::parse);
    Ok(ws.on_upgrade(move |socket| run_ws(socket, state, identity, cached)))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, identity: ChatIdentity, cached: Option<RoomId>) {
    let conn_id = Uuid::new_v4();
    let user_id = identity.user_id.clone();

    let view = match state.chat.attach(identity, cached).await {
        Ok(view) => view,
        Err(e) => {
            warn!(%conn_id, %user_id, error = %e, "chat ws: attach failed");
            let _ = send_json(&mut socket, &BridgeFrame::error(&e)).await;
            return;
        }
    };
    let session = Arc::clone(view.session());
    let mut events = session.subscribe_events();
    info!(%conn_id, %user_id, "chat ws: attached");

    if send_json(&mut socket, &BridgeFrame::snapshot(&session)).await.is_err() {
        return;
    }

    'relay: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&session, text.as_str()).await {
                            if send_json(&mut socket, &frame).await.is_err() {
                                break 'relay;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                let sent = match event {
                    Ok(event) => send_json(&mut socket, &event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%conn_id, skipped, "chat ws: events lagged, resyncing");
                        send_json(&mut socket, &BridgeFrame::snapshot(&session)).await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    drop(view);
    info!(%conn_id, %user_id, "chat ws: detached");
}

/// Parse one inbound command, run it, and return frames for this socket.
async fn process_inbound_text(session: &ChatSession, text: &str) -> Vec<BridgeFrame> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "chat ws: invalid inbound command");
            return vec![BridgeFrame::Error { code: "E_CHAT_BAD_COMMAND", message: format!("invalid command: {e}") }];
        }
    };

    match command {
        ClientCommand::Send { content } => match session.send(&content).await {
            Ok(()) => Vec::new(),
            Err(failed) => vec![BridgeFrame::SendFailed {
                code: failed.error.error_code(),
                message: failed.error.to_string(),
                draft: failed.draft,
            }],
        },
        ClientCommand::SwitchRoom { room_id } => {
            let Some(room) = RoomId::parse(&room_id) else {
                return vec![BridgeFrame::Error { code: "E_CHAT_BAD_ROOM", message: "room id is empty".into() }];
            };
            match session.switch_room(room).await {
                Ok(()) => Vec::new(),
                Err(e) => vec![BridgeFrame::error(&e)],
            }
        }
        ClientCommand::Snapshot => vec![BridgeFrame::snapshot(session)],
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, frame: &T) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "chat ws: failed to serialize frame");
            return Err(());
        }
    };
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
