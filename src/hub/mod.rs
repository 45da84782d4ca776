//! Room membership, signaling relay and chat fan-out for call participants.
//!
//! [`Hub`] owns all shared state behind a single lock. Every operation
//! queues its outbound events before releasing that lock, so each
//! connection observes events in the order the operations were applied.

mod broadcast;
mod directory;
mod history;
mod registry;
mod relay;
mod stats;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::event::{ClientEvent, ServerEvent};

pub use broadcast::Fanout;
pub use directory::{Departure, DirectoryError, RoomId};
pub use history::ChatMessage;
pub use registry::{ConnectionId, Delivery, Presence};
pub use stats::{HubStats, StatsSnapshot};

use directory::RoomDirectory;
use history::HistoryStore;
use registry::ConnectionRegistry;

/// Who hears about a new arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinNotice {
    /// Every member, the joiner included. The joiner learns the member list
    /// through the same event as everyone else.
    #[default]
    Everyone,
    ExistingOnly,
}

/// What happens to a room's chat log once the room has no members left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryRetention {
    #[default]
    DiscardWhenEmpty,
    /// Keep the log; a later room with the same id replays it.
    Keep,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HubPolicy {
    pub join_notice: JoinNotice,
    pub history_retention: HistoryRetention,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HubError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("connection {conn} already joined room {room}")]
    AlreadyJoined { conn: ConnectionId, room: RoomId },
    #[error("room id must not be empty")]
    EmptyRoomId,
    #[error("connection {0} is not in any room")]
    NotInRoom(ConnectionId),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubSnapshot {
    pub connections: usize,
    pub rooms: usize,
    pub buffered_messages: usize,
    pub stats: StatsSnapshot,
}

#[derive(Default)]
struct HubState {
    registry: ConnectionRegistry,
    directory: RoomDirectory,
    history: HistoryStore,
}

/// Cheap to clone; all clones share the same rooms.
#[derive(Clone)]
pub struct Hub {
    state: Arc<Mutex<HubState>>,
    stats: Arc<HubStats>,
    policy: HubPolicy,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubPolicy::default())
    }
}

impl Hub {
    pub fn new(policy: HubPolicy) -> Self {
        Self {
            state: Arc::default(),
            stats: Arc::default(),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // every mutation leaves the maps consistent before anything can panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new transport session. The returned receiver yields
    /// everything addressed to it, starting with [`ServerEvent::Connected`].
    /// Nothing is dropped for a slow reader; events wait in the outbox until
    /// the socket writer catches up or the connection goes away.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let id = state.registry.register(tx);
        state.registry.deliver(id, ServerEvent::Connected { id });
        tracing::info!(conn = %id, "connected");
        (id, rx)
    }

    pub fn handle(&self, conn: ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        match event {
            ClientEvent::Join { room } => self.join(conn, room).map(drop),
            ClientEvent::Signal { target, payload } => match target.parse() {
                Ok(target) => self.signal(conn, target, payload).map(drop),
                Err(_) => self.drop_signal(conn, &target),
            },
            ClientEvent::ChatMessage { content, sender } => self.chat(conn, content, sender).map(drop),
        }
    }

    /// Puts `conn` in `room` and returns the members after the join.
    ///
    /// Members are told about the arrival (per [`JoinNotice`]) before the
    /// room's history is replayed to the joiner alone.
    pub fn join(&self, conn: ConnectionId, room: RoomId) -> Result<Vec<ConnectionId>, HubError> {
        if room.is_empty() {
            self.stats.join_rejected();
            return Err(HubError::EmptyRoomId);
        }

        let mut guard = self.lock();
        let state = &mut *guard;

        match state.registry.presence(conn) {
            None => return Err(HubError::UnknownConnection(conn)),
            Some(Presence::InRoom(current)) => {
                tracing::warn!(conn = %conn, room = %current, requested = %room, "join refused, already in a room");
                self.stats.join_rejected();
                return Err(HubError::AlreadyJoined { conn, room: current.clone() });
            }
            Some(Presence::Unjoined) => {}
        }

        let members = state.directory.join(room.clone(), conn).inspect_err(|err| {
            tracing::error!(conn = %conn, room = %room, %err, "directory out of step with registry");
        })?;
        state.registry.record_join_time(conn);
        state.registry.set_room(conn, room.clone());

        let notified = broadcast::notify_joined(&state.registry, conn, &members, self.policy.join_notice);

        let history = state.history.replay(&room);
        let mut replay_failed = 0;
        for message in history {
            if !state.registry.deliver(conn, message.into()).is_queued() {
                replay_failed += 1;
            }
        }
        self.stats.deliveries_failed(notified.failed + replay_failed);

        tracing::info!(
            conn = %conn,
            room = %room,
            members = members.len(),
            replayed = history.len(),
            "joined room"
        );
        Ok(members)
    }

    /// Forwards an opaque payload from `from` to `target`. A missing target is
    /// not an error; the returned [`Delivery`] says what happened.
    pub fn signal(&self, from: ConnectionId, target: ConnectionId, payload: Value) -> Result<Delivery, HubError> {
        let state = self.lock();
        if !state.registry.is_registered(from) {
            return Err(HubError::UnknownConnection(from));
        }

        let outcome = relay::relay(&state.registry, from, target, payload);
        if outcome.is_queued() {
            self.stats.signal_relayed();
        } else {
            self.stats.signal_dropped();
        }
        Ok(outcome)
    }

    /// A target that cannot name any connection is a miss like any other.
    fn drop_signal(&self, from: ConnectionId, target: &str) -> Result<(), HubError> {
        if !self.is_connected(from) {
            return Err(HubError::UnknownConnection(from));
        }

        tracing::debug!(conn = %from, target, "signal dropped, malformed target");
        self.stats.signal_dropped();
        Ok(())
    }

    /// Logs a chat message in the sender's room and echoes it to every member.
    pub fn chat(&self, from: ConnectionId, content: String, sender: String) -> Result<Fanout, HubError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(room) = state.directory.find_room(from).cloned() else {
            tracing::debug!(conn = %from, "chat from connection outside any room");
            return Err(HubError::NotInRoom(from));
        };
        let members = state.directory.members(&room).unwrap_or_default();

        let message = state.history.append(&room, from, sender, content);
        let fanout = broadcast::broadcast_chat(&state.registry, message, members);

        self.stats.chat_message();
        self.stats.deliveries_failed(fanout.failed);
        tracing::debug!(conn = %from, room = %room, seq = message.seq, recipients = fanout.delivered, "chat message");
        Ok(fanout)
    }

    /// Tears a connection down: it leaves its room, the rest of the room is
    /// told, and the room closes if it was the last member. Only the first
    /// call for a given id has any effect.
    pub fn disconnect(&self, conn: ConnectionId) -> Option<Departure> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let departed = state.registry.deregister(conn)?;
        tracing::info!(
            conn = %conn,
            presence = ?departed.presence,
            connected_for = %departed.connected_for,
            "disconnected"
        );

        let departure = state.directory.leave(conn)?;
        let notified = broadcast::notify_left(&state.registry, conn, &departure.remaining);
        self.stats.deliveries_failed(notified.failed);

        if departure.closed {
            tracing::debug!(room = %departure.room, "room closed");
            if self.policy.history_retention == HistoryRetention::DiscardWhenEmpty {
                let dropped = state.history.discard(&departure.room);
                tracing::debug!(room = %departure.room, dropped, "history discarded");
            }
        }
        Some(departure)
    }

    pub fn is_connected(&self, conn: ConnectionId) -> bool {
        self.lock().registry.is_registered(conn)
    }

    pub fn presence(&self, conn: ConnectionId) -> Option<Presence> {
        self.lock().registry.presence(conn).cloned()
    }

    pub fn find_room(&self, conn: ConnectionId) -> Option<RoomId> {
        self.lock().directory.find_room(conn).cloned()
    }

    pub fn members(&self, room: &RoomId) -> Option<Vec<ConnectionId>> {
        self.lock().directory.members(room).map(<[_]>::to_vec)
    }

    pub fn replay(&self, room: &RoomId) -> Vec<ChatMessage> {
        self.lock().history.replay(room).to_vec()
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let state = self.lock();
        HubSnapshot {
            connections: state.registry.len(),
            rooms: state.directory.room_count(),
            buffered_messages: state.history.message_count(),
            stats: self.stats.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn connect_greets_with_own_id() {
        let hub = Hub::default();
        let (id, mut rx) = hub.connect();
        assert_eq!(rx.try_recv(), Ok(ServerEvent::Connected { id }));
        assert_eq!(hub.presence(id), Some(Presence::Unjoined));
    }

    #[test]
    fn joiner_hears_arrival_before_replay() {
        let hub = Hub::default();
        let room = RoomId::from("room");
        let (a, mut rx_a) = hub.connect();
        hub.join(a, room.clone()).unwrap();
        hub.chat(a, "earlier".into(), "A".into()).unwrap();
        drain(&mut rx_a);

        let (b, mut rx_b) = hub.connect();
        hub.join(b, room.clone()).unwrap();

        assert_eq!(drain(&mut rx_b), vec![
            ServerEvent::Connected { id: b },
            ServerEvent::UserJoined { id: b, members: vec![a, b] },
            ServerEvent::ChatMessage { content: "earlier".into(), sender: "A".into(), from: a },
        ]);
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::UserJoined { id: b, members: vec![a, b] }]);
    }

    #[test]
    fn existing_only_policy_skips_joiner() {
        let hub = Hub::new(HubPolicy { join_notice: JoinNotice::ExistingOnly, ..Default::default() });
        let (a, mut rx_a) = hub.connect();
        hub.join(a, RoomId::from("r")).unwrap();
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::Connected { id: a }]);
    }

    #[test]
    fn second_join_is_rejected_without_side_effects() {
        let hub = Hub::default();
        let (a, mut rx_a) = hub.connect();
        hub.join(a, RoomId::from("one")).unwrap();
        drain(&mut rx_a);

        let err = hub.join(a, RoomId::from("two")).unwrap_err();
        assert_eq!(err, HubError::AlreadyJoined { conn: a, room: RoomId::from("one") });
        assert_eq!(hub.members(&RoomId::from("one")), Some(vec![a]));
        assert_eq!(hub.members(&RoomId::from("two")), None);
        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(hub.snapshot().stats.joins_rejected, 1);
    }

    #[test]
    fn empty_room_id_is_rejected() {
        let hub = Hub::default();
        let (a, _rx) = hub.connect();
        assert_eq!(hub.join(a, RoomId::from("")), Err(HubError::EmptyRoomId));
        assert_eq!(hub.presence(a), Some(Presence::Unjoined));
    }

    #[test]
    fn unknown_connections_are_refused() {
        let hub = Hub::default();
        let ghost = ConnectionId::new();
        assert_eq!(hub.join(ghost, RoomId::from("r")), Err(HubError::UnknownConnection(ghost)));
        assert_eq!(hub.signal(ghost, ConnectionId::new(), json!(1)), Err(HubError::UnknownConnection(ghost)));
    }

    #[test]
    fn chat_outside_room_is_not_found() {
        let hub = Hub::default();
        let (a, _rx) = hub.connect();
        assert_eq!(hub.chat(a, "hello?".into(), "A".into()), Err(HubError::NotInRoom(a)));
        assert_eq!(hub.snapshot().buffered_messages, 0);
    }

    #[test]
    fn disconnect_twice_has_one_effect() {
        let hub = Hub::default();
        let room = RoomId::from("r");
        let (a, _rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        hub.join(a, room.clone()).unwrap();
        hub.join(b, room.clone()).unwrap();
        drain(&mut rx_b);

        let departure = hub.disconnect(a).unwrap();
        assert_eq!(departure.remaining, vec![b]);
        assert!(hub.disconnect(a).is_none());
        assert_eq!(drain(&mut rx_b), vec![ServerEvent::UserLeft { id: a }]);
    }

    #[test]
    fn history_retention_policies() {
        let room = RoomId::from("r");

        let hub = Hub::default();
        let (a, _rx) = hub.connect();
        hub.join(a, room.clone()).unwrap();
        hub.chat(a, "bye".into(), "A".into()).unwrap();
        assert!(hub.disconnect(a).unwrap().closed);
        assert!(hub.replay(&room).is_empty());

        let hub = Hub::new(HubPolicy { history_retention: HistoryRetention::Keep, ..Default::default() });
        let (a, _rx) = hub.connect();
        hub.join(a, room.clone()).unwrap();
        hub.chat(a, "bye".into(), "A".into()).unwrap();
        hub.disconnect(a);
        assert_eq!(hub.members(&room), None);
        assert_eq!(hub.replay(&room).len(), 1);

        let (b, mut rx_b) = hub.connect();
        hub.join(b, room).unwrap();
        assert!(drain(&mut rx_b).contains(&ServerEvent::ChatMessage { content: "bye".into(), sender: "A".into(), from: a }));
    }

    #[test]
    fn slow_reader_misses_nothing() {
        let hub = Hub::default();
        let room = RoomId::from("r");
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        let (c, _rx_c) = hub.connect();
        hub.join(a, room.clone()).unwrap();
        hub.join(b, room.clone()).unwrap();
        hub.join(c, room.clone()).unwrap();

        // b never reads while the room keeps talking
        for n in 0..500 {
            drain(&mut rx_a);
            let fanout = hub.chat(a, format!("msg {n}"), "A".into()).unwrap();
            assert_eq!(fanout, Fanout { delivered: 3, failed: 0 });
        }
        hub.disconnect(c);

        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 1 + 2 + 500 + 1);
        assert_eq!(events.last(), Some(&ServerEvent::UserLeft { id: c }));
        assert_eq!(hub.snapshot().stats.deliveries_failed, 0);
    }

    #[test]
    fn long_history_is_replayed_in_full() {
        let hub = Hub::new(HubPolicy { history_retention: HistoryRetention::Keep, ..Default::default() });
        let room = RoomId::from("busy");
        let (a, _rx_a) = hub.connect();
        hub.join(a, room.clone()).unwrap();
        for n in 0..300 {
            hub.chat(a, format!("line {n}"), "A".into()).unwrap();
        }

        let (late, mut rx_late) = hub.connect();
        hub.join(late, room.clone()).unwrap();

        let replayed: Vec<_> = drain(&mut rx_late)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::ChatMessage { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = (0..300).map(|n| format!("line {n}")).collect();
        assert_eq!(replayed, expected);
        assert_eq!(hub.snapshot().stats.deliveries_failed, 0);
    }

    #[test]
    fn malformed_signal_target_counts_as_dropped() {
        let hub = Hub::default();
        let (a, mut rx_a) = hub.connect();
        drain(&mut rx_a);

        let event: ClientEvent = serde_json::from_value(json!({
            "type": "signal",
            "target": "c99",
            "payload": { "sdp": "v=0" },
        })).unwrap();
        hub.handle(a, event).unwrap();

        assert_eq!(hub.snapshot().stats.signals_dropped, 1);
        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));

        let ghost = ConnectionId::new();
        let event = ClientEvent::Signal { target: "c99".into(), payload: json!(null) };
        assert_eq!(hub.handle(ghost, event), Err(HubError::UnknownConnection(ghost)));
    }
}
