use axum::extract::ws::Message;

use super::ConnectionRegistry;
use crate::ws::protocol::ServerEvent;

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event to one connection. A missing registry entry means the
/// connection is gone; the event is dropped.
pub fn send_to(registry: &ConnectionRegistry, conn_id: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    if let Some(sender) = registry.get(conn_id) {
        let _ = sender.send(msg);
    }
}

/// Send an event to each of the given connections.
pub fn send_to_each<'a, I>(registry: &ConnectionRegistry, conn_ids: I, event: &ServerEvent)
where
    I: IntoIterator<Item = &'a String>,
{
    let Some(msg) = encode(event) else { return };
    for conn_id in conn_ids {
        if let Some(sender) = registry.get(conn_id) {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Send an event to every connected client.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for entry in registry.iter() {
        let _ = entry.value().send(msg.clone());
    }
}
