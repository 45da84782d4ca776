use std::collections::HashMap;

use serde::Serialize;

use super::{ConnectionId, RoomId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Position in the room's log, starting at 0.
    pub seq: u64,
    pub sender: String,
    pub content: String,
    pub from: ConnectionId,
}

/// Append-only chat log per room.
#[derive(Default)]
pub(crate) struct HistoryStore {
    logs: HashMap<RoomId, Vec<ChatMessage>>,
}

impl HistoryStore {
    pub(crate) fn append(&mut self, room: &RoomId, from: ConnectionId, sender: String, content: String) -> &ChatMessage {
        let log = self.logs.entry(room.clone()).or_default();
        let seq = log.len() as u64;
        log.push(ChatMessage { seq, sender, content, from });
        &log[log.len() - 1]
    }

    /// The whole log in append order. Reading does not consume anything.
    pub(crate) fn replay(&self, room: &RoomId) -> &[ChatMessage] {
        self.logs.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn discard(&mut self, room: &RoomId) -> usize {
        self.logs.remove(room).map_or(0, |log| log.len())
    }

    pub(crate) fn message_count(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }
}
