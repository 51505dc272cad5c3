//! Chat room subscription and typing indicators.

use crate::ws::protocol::ServerEvent;
use crate::ws::room::{chat_room, RoomRegistry, RoomTransport};

/// Join a connection to each named chat room of its site.
pub fn subscribe(registry: &mut RoomRegistry, conn_id: &str, site: &str, rooms: Vec<String>) {
    for room in rooms {
        let key = chat_room(site, &room);
        if registry.join(conn_id, &key) {
            tracing::debug!("Connection {} joined chat room {}", conn_id, key);
        }
    }
}

/// Relay a typing indicator to everyone in the chat room.
pub fn typing(registry: &RoomRegistry, site: &str, room: &str, user: &str) -> usize {
    let key = chat_room(site, room);
    registry.broadcast_to_room(&key, &ServerEvent::chat_typing(room, user))
}
