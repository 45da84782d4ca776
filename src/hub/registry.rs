use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::ServerEvent;

use super::RoomId;

/// Server-assigned id of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound queue of one connection, drained by its socket writer. Never
/// full: a live connection receives every event addressed to it.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Where a live connection stands with respect to rooms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Unjoined,
    InRoom(RoomId),
}

/// Result of pushing one event into one connection's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Writer side is gone but teardown has not reached the registry yet.
    Closed,
    Unknown,
}

impl Delivery {
    pub fn is_queued(self) -> bool {
        self == Delivery::Queued
    }
}

/// What the registry knew about a connection when it was torn down.
#[derive(Debug)]
pub struct Departed {
    pub presence: Presence,
    pub connected_for: Duration,
}

struct Connection {
    outbox: Outbox,
    presence: Presence,
    connected_at: OffsetDateTime,
    joined_at: Option<OffsetDateTime>,
}

#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub(crate) fn register(&mut self, outbox: Outbox) -> ConnectionId {
        let mut id = ConnectionId::new();
        while self.connections.contains_key(&id) {
            id = ConnectionId::new();
        }

        self.connections.insert(id, Connection {
            outbox,
            presence: Presence::Unjoined,
            connected_at: OffsetDateTime::now_utc(),
            joined_at: None,
        });
        id
    }

    /// Stamps the first join. Later calls keep the original timestamp.
    pub(crate) fn record_join_time(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.joined_at.get_or_insert_with(OffsetDateTime::now_utc);
        }
    }

    pub(crate) fn presence(&self, id: ConnectionId) -> Option<&Presence> {
        self.connections.get(&id).map(|conn| &conn.presence)
    }

    pub(crate) fn set_room(&mut self, id: ConnectionId, room: RoomId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.presence = Presence::InRoom(room);
        }
    }

    /// Drops the connection. Only the first call for an id yields a [`Departed`].
    pub(crate) fn deregister(&mut self, id: ConnectionId) -> Option<Departed> {
        let conn = self.connections.remove(&id)?;
        let since = conn.joined_at.unwrap_or(conn.connected_at);

        Some(Departed {
            presence: conn.presence,
            connected_for: OffsetDateTime::now_utc() - since,
        })
    }

    pub(crate) fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub(crate) fn deliver(&self, id: ConnectionId, event: ServerEvent) -> Delivery {
        let Some(conn) = self.connections.get(&id) else {
            return Delivery::Unknown;
        };

        match conn.outbox.send(event) {
            Ok(()) => Delivery::Queued,
            Err(_) => Delivery::Closed,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }
}
