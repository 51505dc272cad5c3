//! Websocket transport: connection state, wire protocol, room registry and
//! the axum upgrade handler.

pub mod connection;
pub mod handler;
pub mod protocol;
pub mod room;

pub use connection::{Admission, Connection, ConnectionId, OutgoingMessage};
pub use protocol::{ClientEvent, ServerEvent};
pub use room::{RoomRegistry, RoomTransport};
