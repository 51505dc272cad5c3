//! Room registry: the in-memory membership sets every component shares.
//!
//! A room exists only while it has members. Join and leave are idempotent.

use super::connection::{Connection, ConnectionId};
use super::protocol::ServerEvent;
use std::collections::HashMap;

/// Kinds of room a connection can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    All,
    User,
    Doc,
    OpenDoc,
    Task,
    Chat,
}

impl RoomKind {
    /// Segment used in the room key. Task and chat keep the names backend
    /// publishers already address.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::All => "all",
            RoomKind::User => "user",
            RoomKind::Doc => "doc",
            RoomKind::OpenDoc => "open_doc",
            RoomKind::Task => "task_progress",
            RoomKind::Chat => "room",
        }
    }

    pub fn key(&self, site: &str, id: &str) -> String {
        format!("{}:{}:{}", site, self.as_str(), id)
    }
}

pub fn site_room(site: &str) -> String {
    format!("{}:{}", site, RoomKind::All.as_str())
}

pub fn user_room(site: &str, user: &str) -> String {
    RoomKind::User.key(site, user)
}

pub fn doc_room(site: &str, doctype: &str, docname: &str) -> String {
    RoomKind::Doc.key(site, &format!("{}/{}", doctype, docname))
}

pub fn open_doc_room(site: &str, doctype: &str, docname: &str) -> String {
    RoomKind::OpenDoc.key(site, &format!("{}/{}", doctype, docname))
}

pub fn task_room(site: &str, task_id: &str) -> String {
    RoomKind::Task.key(site, task_id)
}

pub fn chat_room(site: &str, room: &str) -> String {
    RoomKind::Chat.key(site, room)
}

/// The narrow surface components use to reach connections.
///
/// Inbound events do not pass through here: `ws::handler` decodes each frame
/// and hands it to `Gateway::handle_event`.
pub trait RoomTransport {
    /// Returns true if membership changed.
    fn join(&mut self, conn_id: &str, room: &str) -> bool;
    /// Returns true if membership changed.
    fn leave(&mut self, conn_id: &str, room: &str) -> bool;
    /// Returns the number of connections the event was queued for.
    fn broadcast_to_room(&self, room: &str, event: &ServerEvent) -> usize;
    fn broadcast_all(&self, event: &ServerEvent) -> usize;
    fn send_to(&self, conn_id: &str, event: ServerEvent) -> bool;
}

/// All live connections and their room memberships.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// Members per room in join order
    rooms: HashMap<String, Vec<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: Connection) -> ConnectionId {
        let id = conn.id.clone();
        self.connections.insert(id.clone(), conn);
        id
    }

    /// Remove a connection, dropping it from every room and discarding its
    /// in-flight uploads. Returns the removed connection.
    pub fn unregister(&mut self, conn_id: &str) -> Option<Connection> {
        let mut conn = self.connections.remove(conn_id)?;

        for room in conn.rooms.drain() {
            self.remove_member(&room, conn_id);
        }
        conn.uploads.clear();

        Some(conn)
    }

    pub fn is_connected(&self, conn_id: &str) -> bool {
        self.connections.contains_key(conn_id)
    }

    pub fn connection(&self, conn_id: &str) -> Option<&Connection> {
        self.connections.get(conn_id)
    }

    pub fn connection_mut(&mut self, conn_id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(conn_id)
    }

    /// Members of a room in join order.
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Users of a room's members in join order; one entry per connection.
    pub fn member_users(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.connections.get(id))
                    .map(|conn| conn.user().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn remove_member(&mut self, room: &str, conn_id: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.retain(|id| id != conn_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

impl RoomTransport for RoomRegistry {
    fn join(&mut self, conn_id: &str, room: &str) -> bool {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return false;
        };
        if !conn.rooms.insert(room.to_string()) {
            return false;
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .push(conn_id.to_string());
        true
    }

    fn leave(&mut self, conn_id: &str, room: &str) -> bool {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return false;
        };
        if !conn.rooms.remove(room) {
            return false;
        }
        self.remove_member(room, conn_id);
        true
    }

    fn broadcast_to_room(&self, room: &str, event: &ServerEvent) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter_map(|id| self.connections.get(id))
            // Non-blocking send, drop if buffer full
            .filter(|conn| conn.try_send_event(event.clone()))
            .count()
    }

    fn broadcast_all(&self, event: &ServerEvent) -> usize {
        self.connections
            .values()
            .filter(|conn| conn.try_send_event(event.clone()))
            .count()
    }

    fn send_to(&self, conn_id: &str, event: ServerEvent) -> bool {
        self.connections
            .get(conn_id)
            .map(|conn| conn.try_send_event(event))
            .unwrap_or(false)
    }
}
