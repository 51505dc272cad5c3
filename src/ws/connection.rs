//! Per-connection state for gateway connections.

use super::protocol::ServerEvent;
use crate::backend::{Session, GUEST};
use crate::upload::UploadTable;
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::mpsc;

/// Unique connection ID.
pub type ConnectionId = String;

/// Outgoing message to send to a websocket client.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    Event(ServerEvent),
}

/// Outcome of the gatekeeper for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Authenticated(String),
    /// Guest admitted to the guest room
    GuestAllowed,
    /// Guest admitted but joined to nothing
    GuestDenied,
}

impl Admission {
    pub fn user(&self) -> &str {
        match self {
            Admission::Authenticated(user) => user,
            Admission::GuestAllowed | Admission::GuestDenied => GUEST,
        }
    }
}

/// Per-connection state.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID (server-generated UUID)
    pub id: ConnectionId,

    pub admission: Admission,

    /// Site plus the credentials used for collaborator calls
    pub session: Session,

    /// Rooms this connection is joined to
    pub rooms: HashSet<String>,

    /// In-flight uploads keyed by filename
    pub uploads: UploadTable,

    pub connected_at: Instant,

    /// Sender for outgoing messages to this connection
    sender: mpsc::Sender<OutgoingMessage>,
}

impl Connection {
    pub fn new(
        admission: Admission,
        session: Session,
        sender: mpsc::Sender<OutgoingMessage>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            admission,
            session,
            rooms: HashSet::new(),
            uploads: UploadTable::default(),
            connected_at: Instant::now(),
            sender,
        }
    }

    pub fn user(&self) -> &str {
        self.admission.user()
    }

    pub fn site(&self) -> &str {
        &self.session.site
    }

    /// Send a message to this connection (non-blocking).
    /// Returns false if the channel is full or closed.
    pub fn try_send(&self, msg: OutgoingMessage) -> bool {
        self.sender.try_send(msg).is_ok()
    }

    pub fn try_send_event(&self, event: ServerEvent) -> bool {
        self.try_send(OutgoingMessage::Event(event))
    }
}
