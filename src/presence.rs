//! "Who is viewing this document" signal.
//!
//! The viewer list is recomputed from live open_doc membership on every
//! open or close; nothing is cached between broadcasts.
//!
//! A connection that drops without sending `doc_close` leaves the room
//! through disconnect cleanup, but no recompute is broadcast for it. The
//! remaining viewers keep the stale list until the next open or close.

use crate::ws::protocol::ServerEvent;
use crate::ws::room::{open_doc_room, RoomRegistry, RoomTransport};

/// Users currently joined to a document's open_doc room, in join order.
/// A user with several connections appears once per connection.
pub fn viewers(registry: &RoomRegistry, site: &str, doctype: &str, docname: &str) -> Vec<String> {
    registry.member_users(&open_doc_room(site, doctype, docname))
}

/// Recompute the viewer list and send it to everyone still in the room.
/// Returns the list that was sent.
pub fn broadcast_viewers(
    registry: &RoomRegistry,
    site: &str,
    doctype: &str,
    docname: &str,
) -> Vec<String> {
    let room = open_doc_room(site, doctype, docname);
    let viewers = registry.member_users(&room);
    let delivered =
        registry.broadcast_to_room(&room, &ServerEvent::doc_viewers(doctype, docname, &viewers));
    tracing::debug!(
        "Viewers of {}: {:?} (sent to {} connections)",
        room,
        viewers,
        delivered
    );
    viewers
}
