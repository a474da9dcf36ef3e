//! JSON wire protocol: `{"event": "...", "data": ...}` text frames, modeled
//! as tagged unions over the event kinds. Decoding failures are logged with
//! full detail server-side and answered with a generic `server_error`; the
//! connection stays open and usable.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::lobby::directory::{Player, RoomDetails, RoomSummary};
use crate::lobby::service;
use crate::signaling::{self, RelayKind};
use crate::state::AppState;

/// Inbound events. `connect`/`disconnect` are transport-level (socket open
/// and close) and never appear on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    PlayerUpdate(PlayerUpdatePayload),
    Join(JoinPayload),
    Welcome(Value),
    Ice(Value),
    Sdp(Value),
    ExitRoom(ExitRoomPayload),
}

#[derive(Debug, Deserialize)]
pub struct PlayerUpdatePayload {
    pub player: Player,
}

#[derive(Debug, Deserialize)]
pub struct JoinPayload {
    pub room: String,
    pub player: Player,
}

#[derive(Debug, Deserialize)]
pub struct ExitRoomPayload {
    pub room: String,
}

/// Outbound events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    PlayerUpdate(RoomDetails),
    RoomUpdate(RoomUpdatePayload),
    JoinSuccess(RoomDetails),
    JoinFailure(JoinFailurePayload),
    NewUser(NewUserPayload),
    Bye(String),
    Welcome(Value),
    Ice(Value),
    Sdp(Value),
    ServerError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomUpdatePayload {
    #[serde(rename = "publicRooms")]
    pub public_rooms: Vec<RoomSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinFailurePayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUserPayload {
    pub player: Player,
}

/// Decode one inbound text frame and dispatch it to the lobby or the relay.
pub fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    conn_id: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                conn_id = %conn_id,
                error = %e,
                raw = %text.chars().take(256).collect::<String>(),
                "Malformed client event"
            );
            send_event(tx, &ServerEvent::ServerError("invalid event payload".to_string()));
            return;
        }
    };

    match event {
        ClientEvent::PlayerUpdate(payload) => {
            service::handle_player_update(state, conn_id, payload.player);
        }
        ClientEvent::Join(payload) => {
            service::handle_join(state, conn_id, &payload.room, payload.player);
        }
        ClientEvent::Welcome(data) => signaling::relay(state, conn_id, RelayKind::Welcome, data),
        ClientEvent::Ice(data) => signaling::relay(state, conn_id, RelayKind::Ice, data),
        ClientEvent::Sdp(data) => signaling::relay(state, conn_id, RelayKind::Sdp, data),
        ClientEvent::ExitRoom(payload) => {
            service::handle_exit_room(state, conn_id, &payload.room);
        }
    }
}

/// Encode and send a server event directly on one connection's channel.
pub fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = tx.send(Message::Text(json.into()));
    }
}
