//! Room lifecycle policy and broadcast fan-out.
//!
//! Each handler locks the directory once, applies the mutation, and sends
//! every resulting notification before releasing the lock, so no client can
//! observe an intermediate state. Room-scoped notifications always precede
//! the global public-room listing within one triggering event.

use std::sync::MutexGuard;

use crate::lobby::directory::{DirectoryError, Player, RoomDirectory};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::{JoinFailurePayload, NewUserPayload, RoomUpdatePayload, ServerEvent};

const GENERIC_FAILURE: &str = "internal server error";

/// A freshly accepted connection gets the current public-room listing.
pub fn handle_connect(state: &AppState, conn_id: &str) {
    let Some(directory) = lock_directory(state, conn_id) else {
        return;
    };
    let listing = directory.public_rooms_with_occupants();
    drop(directory);
    broadcast::send_to(
        &state.connections,
        conn_id,
        &ServerEvent::RoomUpdate(RoomUpdatePayload { public_rooms: listing }),
    );
    tracing::info!(conn_id = %conn_id, "Client connected");
}

/// Profile update for the sending identity. The first update creates the
/// player inside its private staging room (room code == own connection id);
/// later updates merge fields in place. Either way the room's members get
/// a fresh roster.
pub fn handle_player_update(state: &AppState, conn_id: &str, mut player: Player) {
    player.id = conn_id.to_string();
    let Some(mut directory) = lock_directory(state, conn_id) else {
        return;
    };

    let result = if directory.contains_player(conn_id) {
        directory.update_player(player)
    } else {
        directory
            .insert_player(player, conn_id)
            .map(|_| conn_id.to_string())
    };

    match result {
        Ok(room_id) => notify_room_roster(state, &directory, &room_id),
        Err(err) => report_directory_error(state, conn_id, &err),
    }
}

/// Join request. Already a member: idempotent success without mutation.
/// Room at capacity: rejected without mutation. Otherwise the player is
/// moved, the vacated room is torn down if emptied, and all affected
/// parties are notified.
pub fn handle_join(state: &AppState, conn_id: &str, room_id: &str, mut player: Player) {
    player.id = conn_id.to_string();
    let Some(mut directory) = lock_directory(state, conn_id) else {
        return;
    };

    if directory.is_player_in_room(conn_id, room_id) {
        if let Some(details) = directory.room_details(room_id) {
            broadcast::send_to(&state.connections, conn_id, &ServerEvent::JoinSuccess(details));
        }
        return;
    }

    if directory.occupancy(room_id) >= state.max_players_per_room {
        tracing::info!(conn_id = %conn_id, room_id = %room_id, "Join rejected: room full");
        broadcast::send_to(
            &state.connections,
            conn_id,
            &ServerEvent::JoinFailure(JoinFailurePayload {
                reason: "room is full".to_string(),
            }),
        );
        return;
    }

    let prev_room = directory.room_of(conn_id).map(str::to_string);
    let prev_was_public = prev_room
        .as_deref()
        .and_then(|room| directory.room_public(room))
        .unwrap_or(false);
    // Category is fixed at creation: pre-existing rooms keep their flag,
    // a room created by this join is public iff its code is not the
    // joiner's own id.
    let target_public = directory
        .room_public(room_id)
        .unwrap_or(room_id != conn_id);
    let existing_members = directory.member_ids(room_id);

    if let Err(err) = directory.insert_player(player.clone(), room_id) {
        report_directory_error(state, conn_id, &err);
        return;
    }
    tracing::info!(
        conn_id = %conn_id,
        room_id = %room_id,
        display_name = player.display_name.as_deref().unwrap_or(""),
        "Player joined room"
    );

    notify_room_roster(state, &directory, room_id);
    if let Some(prev) = &prev_room {
        // The vacated room, if it survived, sees the departure.
        if directory.room_details(prev).is_some() {
            notify_room_roster(state, &directory, prev);
            let remaining = directory.member_ids(prev);
            broadcast::send_to_each(
                &state.connections,
                remaining.iter(),
                &ServerEvent::Bye(conn_id.to_string()),
            );
        }
    }
    broadcast::send_to_each(
        &state.connections,
        existing_members.iter(),
        &ServerEvent::NewUser(NewUserPayload { player }),
    );
    if let Some(details) = directory.room_details(room_id) {
        broadcast::send_to(&state.connections, conn_id, &ServerEvent::JoinSuccess(details));
    }
    if target_public || prev_was_public {
        notify_public_rooms(state, &directory);
    }
}

/// Voluntary departure. The player record is removed entirely; a later
/// profile update starts over in a fresh staging room. The leaver also
/// receives a `bye` for each former roommate so the client can tear down
/// its peer connections.
pub fn handle_exit_room(state: &AppState, conn_id: &str, room_id: &str) {
    let Some(mut directory) = lock_directory(state, conn_id) else {
        return;
    };

    if !directory.is_player_in_room(conn_id, room_id) {
        tracing::warn!(conn_id = %conn_id, room_id = %room_id, "exit_room for a room the player is not in");
        broadcast::send_to(
            &state.connections,
            conn_id,
            &ServerEvent::ServerError(GENERIC_FAILURE.to_string()),
        );
        return;
    }

    let was_public = directory.room_public(room_id).unwrap_or(false);
    let former_members = directory.member_ids(room_id);
    if let Err(err) = directory.delete_player(conn_id) {
        report_directory_error(state, conn_id, &err);
        return;
    }
    tracing::info!(conn_id = %conn_id, room_id = %room_id, "Player left room");

    if directory.room_details(room_id).is_some() {
        notify_room_roster(state, &directory, room_id);
        let remaining = directory.member_ids(room_id);
        broadcast::send_to_each(
            &state.connections,
            remaining.iter(),
            &ServerEvent::Bye(conn_id.to_string()),
        );
    }
    for member in former_members.iter().filter(|m| m.as_str() != conn_id) {
        broadcast::send_to(&state.connections, conn_id, &ServerEvent::Bye(member.clone()));
    }
    if was_public {
        notify_public_rooms(state, &directory);
    }
}

/// Transport-level disconnect. Same teardown as exit_room, minus anything
/// addressed to the connection that just went away.
pub fn handle_disconnect(state: &AppState, conn_id: &str) {
    let Some(mut directory) = lock_directory(state, conn_id) else {
        return;
    };

    let Some(room_id) = directory.room_of(conn_id).map(str::to_string) else {
        tracing::info!(conn_id = %conn_id, "Client disconnected (no player record)");
        return;
    };
    let was_public = directory.room_public(&room_id).unwrap_or(false);
    if let Err(err) = directory.delete_player(conn_id) {
        // The triggering connection is gone; log only.
        tracing::error!(conn_id = %conn_id, error = %err, "Directory teardown failed");
        return;
    }
    tracing::info!(conn_id = %conn_id, room_id = %room_id, "Client disconnected");

    if directory.room_details(&room_id).is_some() {
        notify_room_roster(state, &directory, &room_id);
        let remaining = directory.member_ids(&room_id);
        broadcast::send_to_each(
            &state.connections,
            remaining.iter(),
            &ServerEvent::Bye(conn_id.to_string()),
        );
    }
    if was_public {
        notify_public_rooms(state, &directory);
    }
}

/// Full roster of a room to every member, including the actor.
fn notify_room_roster(state: &AppState, directory: &RoomDirectory, room_id: &str) {
    if let Some(details) = directory.room_details(room_id) {
        let targets: Vec<String> = details.players.iter().map(|p| p.id.clone()).collect();
        broadcast::send_to_each(
            &state.connections,
            targets.iter(),
            &ServerEvent::PlayerUpdate(details),
        );
    }
}

/// Updated public-room listing to every connected client.
fn notify_public_rooms(state: &AppState, directory: &RoomDirectory) {
    broadcast::broadcast_to_all(
        &state.connections,
        &ServerEvent::RoomUpdate(RoomUpdatePayload {
            public_rooms: directory.public_rooms_with_occupants(),
        }),
    );
}

fn lock_directory<'a>(
    state: &'a AppState,
    conn_id: &str,
) -> Option<MutexGuard<'a, RoomDirectory>> {
    match state.directory.lock() {
        Ok(guard) => Some(guard),
        Err(_) => {
            tracing::error!(conn_id = %conn_id, "Directory lock poisoned");
            broadcast::send_to(
                &state.connections,
                conn_id,
                &ServerEvent::ServerError(GENERIC_FAILURE.to_string()),
            );
            None
        }
    }
}

fn report_directory_error(state: &AppState, conn_id: &str, err: &DirectoryError) {
    // InvariantViolation carries the full state dump; it ends up in the
    // server log only, the client sees a generic failure.
    tracing::error!(conn_id = %conn_id, error = %err, "Directory operation failed");
    broadcast::send_to(
        &state.connections,
        conn_id,
        &ServerEvent::ServerError(GENERIC_FAILURE.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use serde_json::{json, Map, Value};
    use tokio::sync::mpsc;

    fn connect(state: &AppState, id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.connections.insert(id.to_string(), tx);
        rx
    }

    fn profile(name: &str) -> Player {
        Player {
            id: String::new(),
            display_name: Some(name.to_string()),
            extra: Map::new(),
        }
    }

    /// Drain a connection's pending events into (event name, data) pairs.
    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<(String, Value)> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(&text).unwrap();
                events.push((
                    value["event"].as_str().unwrap().to_string(),
                    value["data"].clone(),
                ));
            }
        }
        events
    }

    fn join_lobby(state: &AppState, conn_id: &str, room: &str, name: &str) {
        handle_player_update(state, conn_id, profile(name));
        handle_join(state, conn_id, room, profile(name));
    }

    #[test]
    fn connect_sends_room_snapshot_to_that_connection_only() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");

        handle_connect(&state, "a");
        let events = drain(&mut a);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "room_update");
        assert_eq!(events[0].1["publicRooms"], json!([]));
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn first_join_creates_public_room_and_confirms_to_joiner() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");

        handle_player_update(&state, "a", profile("Red"));
        let events = drain(&mut a);
        // Staging roster only: private room, no global listing change.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "player_update");
        assert_eq!(events[0].1["roomId"], "a");
        assert_eq!(events[0].1["public"], false);

        handle_join(&state, "a", "L1", profile("Red"));
        let events = drain(&mut a);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["player_update", "join_success", "room_update"]);
        assert_eq!(events[0].1["roomId"], "L1");
        assert_eq!(events[0].1["public"], true);
        assert_eq!(events[1].1["players"].as_array().unwrap().len(), 1);
        assert_eq!(events[2].1["publicRooms"], json!([{"roomId": "L1", "count": 1}]));
    }

    #[test]
    fn second_join_notifies_existing_members_in_order() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        drain(&mut a);

        join_lobby(&state, "b", "L1", "Blu");
        let a_events = drain(&mut a);
        let a_names: Vec<&str> = a_events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(a_names, ["player_update", "new_user", "room_update"]);
        assert_eq!(a_events[0].1["players"].as_array().unwrap().len(), 2);
        assert_eq!(a_events[1].1["player"]["id"], "b");
        assert_eq!(a_events[2].1["publicRooms"][0]["count"], 2);

        let b_events = drain(&mut b);
        let b_names: Vec<&str> = b_events.iter().map(|(name, _)| name.as_str()).collect();
        // b's own staging roster, then the join outcome.
        assert_eq!(
            b_names,
            ["player_update", "player_update", "join_success", "room_update"]
        );
    }

    #[test]
    fn rejoining_same_room_reconfirms_without_side_effects() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        join_lobby(&state, "b", "L1", "Blu");
        drain(&mut a);
        drain(&mut b);

        handle_join(&state, "b", "L1", profile("Blu"));
        let b_events = drain(&mut b);
        assert_eq!(b_events.len(), 1);
        assert_eq!(b_events[0].0, "join_success");
        // Nobody else hears anything.
        assert!(drain(&mut a).is_empty());
    }

    #[test]
    fn join_at_capacity_is_rejected_without_mutation() {
        let state = AppState::open(1);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        drain(&mut a);

        handle_player_update(&state, "b", profile("Blu"));
        drain(&mut b);
        handle_join(&state, "b", "L1", profile("Blu"));

        let b_events = drain(&mut b);
        assert_eq!(b_events.len(), 1);
        assert_eq!(b_events[0].0, "join_failure");
        assert_eq!(b_events[0].1["reason"], "room is full");
        // No membership change anywhere.
        assert!(drain(&mut a).is_empty());
        let directory = state.directory.lock().unwrap();
        assert_eq!(directory.occupancy("L1"), 1);
        assert!(directory.is_player_in_room("b", "b"));
    }

    #[test]
    fn moving_between_rooms_notifies_the_vacated_room() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        join_lobby(&state, "b", "L1", "Blu");
        drain(&mut a);
        drain(&mut b);

        handle_join(&state, "b", "L2", profile("Blu"));
        let a_events = drain(&mut a);
        let a_names: Vec<&str> = a_events.iter().map(|(name, _)| name.as_str()).collect();
        // Roster of the vacated room, departure notice, new global listing.
        assert_eq!(a_names, ["player_update", "bye", "room_update"]);
        assert_eq!(a_events[0].1["players"].as_array().unwrap().len(), 1);
        assert_eq!(a_events[1].1, json!("b"));
        let listing = a_events[2].1["publicRooms"].as_array().unwrap();
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn disconnect_removes_player_and_notifies_room() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        join_lobby(&state, "b", "L1", "Blu");
        drain(&mut a);
        drain(&mut b);

        state.connections.remove("b");
        handle_disconnect(&state, "b");

        let a_events = drain(&mut a);
        let a_names: Vec<&str> = a_events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(a_names, ["player_update", "bye", "room_update"]);
        assert_eq!(a_events[0].1["players"].as_array().unwrap().len(), 1);
        assert_eq!(a_events[1].1, json!("b"));
        assert_eq!(a_events[2].1["publicRooms"][0]["count"], 1);
    }

    #[test]
    fn disconnect_of_last_member_destroys_the_room() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        handle_connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        drain(&mut a);
        drain(&mut b);

        state.connections.remove("a");
        handle_disconnect(&state, "a");

        let b_events = drain(&mut b);
        assert_eq!(b_events.len(), 1);
        assert_eq!(b_events[0].0, "room_update");
        assert_eq!(b_events[0].1["publicRooms"], json!([]));
        assert!(state.directory.lock().unwrap().room_details("L1").is_none());
    }

    #[test]
    fn exit_room_sends_byes_both_ways() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        join_lobby(&state, "b", "L1", "Blu");
        drain(&mut a);
        drain(&mut b);

        handle_exit_room(&state, "b", "L1");
        let a_events = drain(&mut a);
        let a_names: Vec<&str> = a_events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(a_names, ["player_update", "bye", "room_update"]);

        let b_events = drain(&mut b);
        // The leaver gets a bye for each former roommate.
        assert_eq!(b_events.len(), 2);
        assert_eq!(b_events[0].0, "bye");
        assert_eq!(b_events[0].1, json!("a"));
        assert_eq!(b_events[1].0, "room_update");
        assert!(!state.directory.lock().unwrap().contains_player("b"));
    }

    #[test]
    fn exit_room_when_not_a_member_reports_generic_error() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        handle_exit_room(&state, "a", "L1");
        let events = drain(&mut a);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "server_error");
    }

    #[test]
    fn profile_update_reaches_all_roommates() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");
        join_lobby(&state, "a", "L1", "Red");
        join_lobby(&state, "b", "L1", "Blu");
        drain(&mut a);
        drain(&mut b);

        let mut patch = profile("Crimson");
        patch.extra.insert("score".into(), 3.into());
        handle_player_update(&state, "a", patch);

        for rx in [&mut a, &mut b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].0, "player_update");
            let players = events[0].1["players"].as_array().unwrap();
            let red = players.iter().find(|p| p["id"] == "a").unwrap();
            assert_eq!(red["displayName"], "Crimson");
            assert_eq!(red["score"], 3);
        }
    }

    #[test]
    fn staging_room_changes_never_touch_the_global_listing() {
        let state = AppState::open(20);
        let mut a = connect(&state, "a");
        let mut b = connect(&state, "b");

        handle_player_update(&state, "a", profile("Red"));
        handle_player_update(&state, "a", profile("Redder"));
        assert!(drain(&mut b).is_empty());
        let a_events = drain(&mut a);
        assert!(a_events.iter().all(|(name, _)| name == "player_update"));
    }
}
