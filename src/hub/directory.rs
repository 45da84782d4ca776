use std::{collections::{hash_map::Entry, HashMap}, fmt};

use serde::{Deserialize, Serialize};

use super::ConnectionId;

/// Caller-chosen room name. In practice the page URL the participants share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("connection {conn} is already a member of room {room}")]
    AlreadyMember { conn: ConnectionId, room: RoomId },
}

/// A connection that left, and the room it left behind.
#[derive(Debug, PartialEq, Eq)]
pub struct Departure {
    pub room: RoomId,
    /// Members still present, in join order. Empty when the room was closed.
    pub remaining: Vec<ConnectionId>,
    pub closed: bool,
}

enum Occupancy {
    Occupied,
    Vacant,
}

/// Members in join order. Only ever built around a first member, and dropped
/// by the directory as soon as it reports [`Occupancy::Vacant`].
struct Room {
    members: Vec<ConnectionId>,
}

impl Room {
    fn founded_by(conn: ConnectionId) -> Self {
        Self { members: vec![conn] }
    }

    fn remove(&mut self, conn: ConnectionId) -> Occupancy {
        self.members.retain(|member| *member != conn);
        if self.members.is_empty() {
            Occupancy::Vacant
        } else {
            Occupancy::Occupied
        }
    }
}

#[derive(Default)]
pub(crate) struct RoomDirectory {
    rooms: HashMap<RoomId, Room>,
    // conn -> room, kept in step with every member list
    index: HashMap<ConnectionId, RoomId>,
}

impl RoomDirectory {
    /// Appends `conn` to `room`, opening the room if needed, and returns the
    /// member list after insertion.
    pub(crate) fn join(&mut self, room: RoomId, conn: ConnectionId) -> Result<Vec<ConnectionId>, DirectoryError> {
        if let Some(current) = self.index.get(&conn) {
            return Err(DirectoryError::AlreadyMember { conn, room: current.clone() });
        }

        let members = match self.rooms.entry(room.clone()) {
            Entry::Occupied(entry) => {
                let entry = entry.into_mut();
                entry.members.push(conn);
                entry.members.clone()
            }
            Entry::Vacant(entry) => entry.insert(Room::founded_by(conn)).members.clone(),
        };
        self.index.insert(conn, room);

        Ok(members)
    }

    /// Removes `conn` from whichever room holds it. Closes the room if it
    /// was the last member.
    pub(crate) fn leave(&mut self, conn: ConnectionId) -> Option<Departure> {
        let room_id = self.index.remove(&conn)?;
        let room = self.rooms.get_mut(&room_id)?;

        match room.remove(conn) {
            Occupancy::Occupied => Some(Departure {
                remaining: room.members.clone(),
                room: room_id,
                closed: false,
            }),
            Occupancy::Vacant => {
                self.rooms.remove(&room_id);
                Some(Departure {
                    room: room_id,
                    remaining: Vec::new(),
                    closed: true,
                })
            }
        }
    }

    pub(crate) fn find_room(&self, conn: ConnectionId) -> Option<&RoomId> {
        self.index.get(&conn)
    }

    pub(crate) fn members(&self, room: &RoomId) -> Option<&[ConnectionId]> {
        self.rooms.get(room).map(|room| room.members.as_slice())
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
