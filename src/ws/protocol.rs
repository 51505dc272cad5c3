//! Gateway wire protocol: JSON text frames of the form
//! `{"event": <name>, "data": <payload>}` in both directions.
//!
//! Inbound events form a closed set decoded into [`ClientEvent`]; outbound
//! events are open-ended because the bridge forwards arbitrary names.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EVENT_TASK_PROGRESS: &str = "task_progress";
pub const EVENT_DOC_VIEWERS: &str = "doc_viewers";
pub const EVENT_UPLOAD_REQUEST_SLICE: &str = "upload-request-slice";
pub const EVENT_UPLOAD_END: &str = "upload-end";
pub const EVENT_UPLOAD_ERROR: &str = "upload-error";
pub const EVENT_CHAT_TYPING: &str = "chat.room:typing";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_SOCKET_CONNECTION: &str = "socket-connection";

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskRef {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocRef {
    pub doctype: String,
    pub docname: String,
}

/// One slice of a client-driven upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadSlice {
    /// Target filename, also the key of the upload on this connection
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
    /// Declared total size of the file in bytes
    pub size: u64,
    #[serde(default, deserialize_with = "crate::backend::bool_or_int")]
    pub is_private: bool,
    /// Slice bytes, base64 encoded
    pub data: String,
}

/// A single chat room name or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(room) => vec![room],
            OneOrMany::Many(rooms) => rooms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatRooms {
    pub rooms: OneOrMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatTyping {
    pub room: String,
    pub user: String,
}

/// Every event a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "task_subscribe")]
    TaskSubscribe(TaskRef),
    #[serde(rename = "task_unsubscribe")]
    TaskUnsubscribe(TaskRef),
    #[serde(rename = "progress_subscribe")]
    ProgressSubscribe(TaskRef),
    #[serde(rename = "doc_subscribe")]
    DocSubscribe(DocRef),
    #[serde(rename = "doc_unsubscribe")]
    DocUnsubscribe(DocRef),
    #[serde(rename = "doc_open")]
    DocOpen(DocRef),
    #[serde(rename = "doc_close")]
    DocClose(DocRef),
    #[serde(rename = "upload-accept-slice")]
    UploadAcceptSlice(UploadSlice),
    #[serde(rename = "chat.room:subscribe")]
    ChatSubscribe(ChatRooms),
    #[serde(rename = "chat.message:typing")]
    ChatTyping(ChatTyping),
}

impl ClientEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::TaskSubscribe(_) => "task_subscribe",
            ClientEvent::TaskUnsubscribe(_) => "task_unsubscribe",
            ClientEvent::ProgressSubscribe(_) => "progress_subscribe",
            ClientEvent::DocSubscribe(_) => "doc_subscribe",
            ClientEvent::DocUnsubscribe(_) => "doc_unsubscribe",
            ClientEvent::DocOpen(_) => "doc_open",
            ClientEvent::DocClose(_) => "doc_close",
            ClientEvent::UploadAcceptSlice(_) => "upload-accept-slice",
            ClientEvent::ChatSubscribe(_) => "chat.room:subscribe",
            ClientEvent::ChatTyping(_) => "chat.message:typing",
        }
    }

    /// Whether handling waits on an external collaborator before it can
    /// touch room state. Such events run off the connection's read loop.
    pub fn awaits_collaborator(&self) -> bool {
        matches!(
            self,
            ClientEvent::DocSubscribe(_)
                | ClientEvent::DocOpen(_)
                | ClientEvent::ProgressSubscribe(_)
        )
    }
}

/// Decode one inbound text frame.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// An outbound event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEvent {
    pub event: String,
    pub data: Value,
}

impl ServerEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn task_progress(task_id: &str, lines: Value) -> Self {
        Self::new(
            EVENT_TASK_PROGRESS,
            json!({ "task_id": task_id, "lines": lines }),
        )
    }

    pub fn doc_viewers(doctype: &str, docname: &str, viewers: &[String]) -> Self {
        Self::new(
            EVENT_DOC_VIEWERS,
            json!({ "doctype": doctype, "docname": docname, "viewers": viewers }),
        )
    }

    pub fn upload_request_slice(current_slice: u64) -> Self {
        Self::new(
            EVENT_UPLOAD_REQUEST_SLICE,
            json!({ "current_slice": current_slice }),
        )
    }

    pub fn upload_end(file_url: &str) -> Self {
        Self::new(EVENT_UPLOAD_END, json!({ "file_url": file_url }))
    }

    pub fn upload_error(error: impl std::fmt::Display) -> Self {
        Self::new(EVENT_UPLOAD_ERROR, json!({ "error": error.to_string() }))
    }

    pub fn chat_typing(room: &str, user: &str) -> Self {
        Self::new(EVENT_CHAT_TYPING, json!({ "room": room, "user": user }))
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(EVENT_MESSAGE, Value::String(text.into()))
    }

    pub fn socket_connection(user: &str) -> Self {
        Self::new(EVENT_SOCKET_CONNECTION, json!({ "user": user }))
    }

    pub fn to_text(&self) -> String {
        // Serializing a String key and a Value cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
