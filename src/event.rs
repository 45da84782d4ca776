use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::{ChatMessage, ConnectionId, RoomId};

/// Frames a client may send over its socket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join {
        room: RoomId,
    },
    /// `target` stays a plain string so a bogus id still reaches the hub
    /// and is counted as a dropped signal.
    Signal {
        target: String,
        payload: Value,
    },
    ChatMessage {
        content: String,
        sender: String,
    },
}

/// Frames the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every connection, carrying the id the server assigned to it.
    Connected {
        id: ConnectionId,
    },
    UserJoined {
        id: ConnectionId,
        members: Vec<ConnectionId>,
    },
    UserLeft {
        id: ConnectionId,
    },
    Signal {
        from: ConnectionId,
        payload: Value,
    },
    ChatMessage {
        content: String,
        sender: String,
        from: ConnectionId,
    },
}

impl From<&ChatMessage> for ServerEvent {
    fn from(msg: &ChatMessage) -> Self {
        ServerEvent::ChatMessage {
            content: msg.content.clone(),
            sender: msg.sender.clone(),
            from: msg.from,
        }
    }
}
