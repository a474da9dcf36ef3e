//! Stateless point-to-point negotiation relay.
//!
//! Forwards `welcome` / `ice` / `sdp` payloads unchanged to the destination
//! connection named in the payload. Holds no state between calls and does
//! no membership validation: sender and destination need not share a room.
//! An unconnected destination means the message is silently dropped, with
//! no error back to the sender.

use serde_json::Value;

use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Welcome,
    Ice,
    Sdp,
}

impl RelayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayKind::Welcome => "welcome",
            RelayKind::Ice => "ice",
            RelayKind::Sdp => "sdp",
        }
    }
}

/// Forward a negotiation payload to the connection named by `destinationId`.
pub fn relay(state: &AppState, conn_id: &str, kind: RelayKind, data: Value) {
    let dest = match data.get("destinationId").and_then(Value::as_str) {
        Some(dest) => dest.to_string(),
        None => {
            tracing::warn!(
                conn_id = %conn_id,
                kind = kind.as_str(),
                "Relay event without destinationId"
            );
            broadcast::send_to(
                &state.connections,
                conn_id,
                &ServerEvent::ServerError("invalid event payload".to_string()),
            );
            return;
        }
    };

    if !state.connections.contains_key(&dest) {
        tracing::debug!(
            conn_id = %conn_id,
            dest = %dest,
            kind = kind.as_str(),
            "Relay destination not connected, dropping"
        );
        return;
    }

    tracing::debug!(conn_id = %conn_id, dest = %dest, kind = kind.as_str(), "Relaying payload");
    let event = match kind {
        RelayKind::Welcome => ServerEvent::Welcome(data),
        RelayKind::Ice => ServerEvent::Ice(data),
        RelayKind::Sdp => ServerEvent::Sdp(data),
    };
    broadcast::send_to(&state.connections, &dest, &event);
}
