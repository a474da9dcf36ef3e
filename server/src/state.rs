use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::auth::{Session, UserRecord};
use crate::config::TurnConfig;
use crate::lobby::directory::RoomDirectory;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Active WebSocket connections, one sender per connection id.
    pub connections: ConnectionRegistry,
    /// The room/player directory. All mutations are serialized behind this
    /// single lock: the structural invariant spans two coupled indices and
    /// a half-applied move must never be observable. The lock is never held
    /// across an await point.
    pub directory: Arc<Mutex<RoomDirectory>>,
    /// Registered users (empty when the server runs open).
    pub users: Arc<Vec<UserRecord>>,
    /// Issued session tokens.
    pub sessions: Arc<DashMap<String, Session>>,
    /// When true, the WS upgrade requires a valid session token.
    pub auth_required: bool,
    /// Room capacity; joins beyond this are rejected.
    pub max_players_per_room: usize,
    /// TURN relay configuration for the ICE config endpoint.
    pub turn: Option<TurnConfig>,
}

impl AppState {
    /// State for a server running open (no authentication). Used by main
    /// when no users file is configured, and by tests.
    pub fn open(max_players_per_room: usize) -> Self {
        Self {
            connections: crate::ws::new_connection_registry(),
            directory: Arc::new(Mutex::new(RoomDirectory::new())),
            users: Arc::new(Vec::new()),
            sessions: Arc::new(DashMap::new()),
            auth_required: false,
            max_players_per_room,
            turn: None,
        }
    }
}
