//! Authoritative bidirectional player/room index.
//!
//! The directory owns four coupled maps: room metadata, player records,
//! player -> room, and room -> member set. After every mutation the
//! structural invariant is re-checked: the room-code set equals the
//! membership-index key set, the player-id set equals the ownership-index
//! key set, and the two indices are exact mutual inverses. A violation is
//! an internal defect, never a recoverable condition.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A player record: the connection identifier, the known profile fields,
/// and an open extension map for game-specific fields the server relays
/// but does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Room metadata. The `public` flag is fixed permanently at creation:
/// a room is public iff its code differs from the creating connection's
/// own identifier. Staging rooms (code == owner id) are always private.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub public: bool,
}

/// Roster snapshot returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDetails {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub public: bool,
    pub players: Vec<Player>,
}

/// One entry of the global public-room listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub count: usize,
}

#[derive(Debug)]
pub enum DirectoryError {
    /// `update_player` on an identifier that was never inserted.
    NotFound(String),
    /// The structural invariant failed after a mutation. Carries a full
    /// state dump for server-side logging; clients only ever see a
    /// generic failure.
    InvariantViolation(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::NotFound(id) => write!(f, "player {} not recognized", id),
            DirectoryError::InvariantViolation(dump) => {
                write!(f, "directory invariant violated: {}", dump)
            }
        }
    }
}

impl std::error::Error for DirectoryError {}

/// The in-memory room table. Constructed once at startup and threaded
/// through all handlers behind a single lock; see `AppState`.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
    players: HashMap<String, Player>,
    player_room: HashMap<String, String>,
    room_players: HashMap<String, HashSet<String>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn room_of(&self, player_id: &str) -> Option<&str> {
        self.player_room.get(player_id).map(String::as_str)
    }

    pub fn room_public(&self, room_id: &str) -> Option<bool> {
        self.rooms.get(room_id).map(|r| r.public)
    }

    pub fn occupancy(&self, room_id: &str) -> usize {
        self.room_players.get(room_id).map_or(0, HashSet::len)
    }

    pub fn is_player_in_room(&self, player_id: &str, room_id: &str) -> bool {
        self.player_room.get(player_id).map(String::as_str) == Some(room_id)
    }

    /// Current member connection ids of a room. Empty if the room is unknown.
    pub fn member_ids(&self, room_id: &str) -> Vec<String> {
        self.room_players
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current roster snapshot, or None for an unknown (or deleted) room.
    pub fn room_details(&self, room_id: &str) -> Option<RoomDetails> {
        let room = self.rooms.get(room_id)?;
        let players = self
            .room_players
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|pid| self.players.get(pid).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Some(RoomDetails {
            room_id: room.code.clone(),
            public: room.public,
            players,
        })
    }

    /// All public rooms with at least one occupant, in no guaranteed order.
    pub fn public_rooms_with_occupants(&self) -> Vec<RoomSummary> {
        self.rooms
            .values()
            .filter(|room| room.public && self.occupancy(&room.code) > 0)
            .map(|room| RoomSummary {
                room_id: room.code.clone(),
                count: self.occupancy(&room.code),
            })
            .collect()
    }

    /// Upsert the player record and move it into `room_id`, creating the
    /// room if it is unknown (category fixed now and never re-evaluated).
    /// Returns the previous room id when the player actually moved. The
    /// vacated room is deleted the instant it becomes empty.
    pub fn insert_player(
        &mut self,
        player: Player,
        room_id: &str,
    ) -> Result<Option<String>, DirectoryError> {
        let player_id = player.id.clone();
        if !self.rooms.contains_key(room_id) {
            self.rooms.insert(
                room_id.to_string(),
                Room {
                    code: room_id.to_string(),
                    public: room_id != player_id,
                },
            );
            self.room_players.insert(room_id.to_string(), HashSet::new());
        }
        self.players.insert(player_id.clone(), player);

        let previous = self.player_room.get(&player_id).cloned();
        if previous.as_deref() == Some(room_id) {
            self.check_invariant()?;
            return Ok(None);
        }
        if let Some(prev) = &previous {
            self.vacate(prev, &player_id);
        }
        if let Some(members) = self.room_players.get_mut(room_id) {
            members.insert(player_id.clone());
        }
        self.player_room.insert(player_id, room_id.to_string());
        self.check_invariant()?;
        Ok(previous)
    }

    /// Remove the player record and its membership. Returns the vacated
    /// room id, or None for an unknown player. An emptied room is deleted.
    pub fn delete_player(&mut self, player_id: &str) -> Result<Option<String>, DirectoryError> {
        if self.players.remove(player_id).is_none() {
            return Ok(None);
        }
        let previous = self.player_room.remove(player_id);
        if let Some(prev) = &previous {
            self.vacate(prev, player_id);
        }
        self.check_invariant()?;
        Ok(previous)
    }

    /// Merge profile fields into an existing player record and return its
    /// current room. Never creates a player: an unknown id is NotFound and
    /// leaves all state unchanged.
    pub fn update_player(&mut self, incoming: Player) -> Result<String, DirectoryError> {
        let player_id = incoming.id.clone();
        let existing = self
            .players
            .get_mut(&player_id)
            .ok_or_else(|| DirectoryError::NotFound(player_id.clone()))?;
        if let Some(name) = incoming.display_name {
            existing.display_name = Some(name);
        }
        for (key, value) in incoming.extra {
            existing.extra.insert(key, value);
        }
        self.player_room
            .get(&player_id)
            .cloned()
            .ok_or(DirectoryError::NotFound(player_id))
    }

    /// Drop a player from a room's member set, deleting the room when the
    /// last member leaves.
    fn vacate(&mut self, room_id: &str, player_id: &str) {
        let emptied = match self.room_players.get_mut(room_id) {
            Some(members) => {
                members.remove(player_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.room_players.remove(room_id);
            self.rooms.remove(room_id);
        }
    }

    fn check_invariant(&self) -> Result<(), DirectoryError> {
        let room_codes: HashSet<&String> = self.rooms.keys().collect();
        let membership_codes: HashSet<&String> = self.room_players.keys().collect();
        if room_codes != membership_codes {
            return Err(self.violation("room codes do not match membership index"));
        }
        let player_ids: HashSet<&String> = self.players.keys().collect();
        let owned_ids: HashSet<&String> = self.player_room.keys().collect();
        if player_ids != owned_ids {
            return Err(self.violation("player ids do not match ownership index"));
        }
        for (room_id, members) in &self.room_players {
            for player_id in members {
                if self.player_room.get(player_id) != Some(room_id) {
                    return Err(self.violation("membership entry without matching ownership"));
                }
            }
        }
        for (player_id, room_id) in &self.player_room {
            let listed = self
                .room_players
                .get(room_id)
                .is_some_and(|members| members.contains(player_id));
            if !listed {
                return Err(self.violation("ownership entry without matching membership"));
            }
        }
        Ok(())
    }

    fn violation(&self, what: &str) -> DirectoryError {
        DirectoryError::InvariantViolation(format!("{}; state: {:?}", what, self))
    }
}
