use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth;
use crate::state::AppState;
use crate::ws::{self, actor};

/// Query parameters for WebSocket connection. The session token comes from
/// POST /api/login and is only required when a users file is configured.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket close code for a missing or invalid session token.
const CLOSE_UNAUTHORIZED: u16 = 4001;

/// GET /ws[?token=...]
/// On auth failure, upgrades then immediately closes with 4001. On success,
/// assigns a fresh connection identifier and spawns the actor. Reconnecting
/// clients always start over under a new identity.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let session = params
        .token
        .as_deref()
        .and_then(|token| auth::validate_session(&state, token));

    if state.auth_required && session.is_none() {
        tracing::warn!("WebSocket auth failed: missing or invalid session token");
        return ws.on_upgrade(move |mut socket| async move {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNAUTHORIZED,
                    reason: "Unauthorized".into(),
                })))
                .await;
        });
    }

    let conn_id = ws::new_connection_id();
    match &session {
        Some(session) => tracing::info!(
            conn_id = %conn_id,
            user_id = %session.user_id,
            "WebSocket connection authenticated"
        ),
        None => tracing::info!(conn_id = %conn_id, "WebSocket connection accepted (open mode)"),
    }
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, conn_id))
}
