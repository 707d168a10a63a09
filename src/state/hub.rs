//! Registry of live duplex connections grouped into per-session rooms.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        retro::ConnectedClient,
        ws::{Envelope, EventKind, UserJoinedData, UserLeftData},
    },
    state::rooms::{Member, Rooms},
};

/// Serialised frame queued to a connection's writer.
pub type Frame = Arc<str>;

/// Everything the hub needs to admit one connection.
pub struct ClientHandle {
    /// Connection id, unique per upgrade.
    pub id: Uuid,
    /// Session the connection is bound to for its whole lifetime.
    pub session_id: Uuid,
    /// Authenticated user behind the connection.
    pub user_id: Uuid,
    /// Display name announced to the room.
    pub name: String,
    /// Outbound queue drained by the connection's writer.
    pub tx: mpsc::Sender<Frame>,
}

#[derive(Clone)]
struct ClientInfo {
    session_id: Uuid,
    user_id: Uuid,
    name: String,
}

/// Connection registry: a global id index plus one room per session.
#[derive(Default)]
pub struct Hub {
    clients: DashMap<Uuid, ClientInfo>,
    rooms: Rooms<Frame>,
}

impl Hub {
    /// Create a hub without any connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection and announce `user_joined` to the rest of its room.
    pub fn register(&self, client: ClientHandle) {
        let ClientHandle {
            id,
            session_id,
            user_id,
            name,
            tx,
        } = client;

        let announce = encode(Envelope::new(
            EventKind::UserJoined,
            &UserJoinedData {
                user_id,
                name: name.clone(),
            },
        ));

        self.clients.insert(
            id,
            ClientInfo {
                session_id,
                user_id,
                name,
            },
        );
        let dropped = self
            .rooms
            .join(session_id, Member { id, tx }, announce.as_ref());
        debug!(connection = %id, session = %session_id, user = %user_id, "client registered");
        self.evict(session_id, dropped);
    }

    /// Remove a connection and announce `user_left` to the remaining members.
    ///
    /// Returns `false` when the connection was already gone; only the first call announces.
    pub fn unregister(&self, connection_id: Uuid) -> bool {
        let Some((_, info)) = self.clients.remove(&connection_id) else {
            return false;
        };
        self.rooms.leave(info.session_id, connection_id);
        debug!(connection = %connection_id, session = %info.session_id, user = %info.user_id, "client unregistered");
        self.announce_left(info.session_id, info.user_id);
        true
    }

    /// Serialise `envelope` once and offer it to every member of the session's room.
    pub fn broadcast_to_room(&self, session_id: Uuid, envelope: &Envelope) {
        match serde_json::to_string(envelope) {
            Ok(text) => self.broadcast_frame(session_id, text.into()),
            Err(err) => warn!(error = %err, "failed to serialise realtime envelope"),
        }
    }

    /// Offer an already serialised frame to every member of the session's room.
    ///
    /// Members whose queue is full are dropped and announced as having left.
    pub fn broadcast_frame(&self, session_id: Uuid, frame: Frame) {
        let dropped = self.rooms.deliver(session_id, &frame);
        self.evict(session_id, dropped);
    }

    /// Users connected to the session's room, in join order.
    pub fn room_members(&self, session_id: Uuid) -> Vec<ConnectedClient> {
        self.rooms
            .member_ids(session_id)
            .into_iter()
            .filter_map(|id| {
                self.clients.get(&id).map(|info| ConnectedClient {
                    user_id: info.user_id,
                    name: info.name.clone(),
                })
            })
            .collect()
    }

    /// Number of connections in the session's room.
    pub fn room_size(&self, session_id: Uuid) -> usize {
        self.rooms.len(session_id)
    }

    /// Number of connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Whether the connection is still registered.
    pub fn is_registered(&self, connection_id: Uuid) -> bool {
        self.clients.contains_key(&connection_id)
    }

    fn announce_left(&self, session_id: Uuid, user_id: Uuid) {
        let Some(frame) = encode(Envelope::new(EventKind::UserLeft, &UserLeftData { user_id }))
        else {
            return;
        };
        let dropped = self.rooms.deliver(session_id, &frame);
        self.evict(session_id, dropped);
    }

    // Announcing a departure can itself overflow another queue, hence the worklist.
    fn evict(&self, session_id: Uuid, mut dropped: Vec<Uuid>) {
        while let Some(connection_id) = dropped.pop() {
            let Some((_, info)) = self.clients.remove(&connection_id) else {
                continue;
            };
            warn!(
                connection = %connection_id,
                session = %session_id,
                user = %info.user_id,
                "dropping slow websocket consumer"
            );
            let Some(frame) = encode(Envelope::new(
                EventKind::UserLeft,
                &UserLeftData {
                    user_id: info.user_id,
                },
            )) else {
                continue;
            };
            dropped.extend(self.rooms.deliver(session_id, &frame));
        }
    }
}

fn encode(envelope: serde_json::Result<Envelope>) -> Option<Frame> {
    envelope
        .and_then(|envelope| serde_json::to_string(&envelope))
        .map(Frame::from)
        .map_err(|err| warn!(error = %err, "failed to serialise realtime envelope"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(session_id: Uuid, capacity: usize) -> (ClientHandle, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            ClientHandle {
                id: Uuid::new_v4(),
                session_id,
                user_id: Uuid::new_v4(),
                name: "Ada".into(),
                tx,
            },
            rx,
        )
    }

    fn kinds(rx: &mut mpsc::Receiver<Frame>) -> Vec<EventKind> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| Envelope::from_json_str(&frame).unwrap().kind)
            .collect()
    }

    #[test]
    fn join_is_announced_to_other_members_only() {
        let hub = Hub::new();
        let session = Uuid::new_v4();
        let (first, mut first_rx) = client(session, 8);
        let (second, mut second_rx) = client(session, 8);

        hub.register(first);
        hub.register(second);

        assert_eq!(kinds(&mut first_rx), vec![EventKind::UserJoined]);
        assert!(kinds(&mut second_rx).is_empty());
        assert_eq!(hub.room_size(session), 2);
    }

    #[test]
    fn unregister_announces_once() {
        let hub = Hub::new();
        let session = Uuid::new_v4();
        let (first, mut first_rx) = client(session, 8);
        let (second, _second_rx) = client(session, 8);
        let second_id = second.id;
        hub.register(first);
        hub.register(second);
        kinds(&mut first_rx);

        assert!(hub.unregister(second_id));
        assert!(!hub.unregister(second_id));

        assert_eq!(kinds(&mut first_rx), vec![EventKind::UserLeft]);
        assert_eq!(hub.room_size(session), 1);
    }

    #[test]
    fn last_member_leaving_removes_the_room() {
        let hub = Hub::new();
        let session = Uuid::new_v4();
        let (only, _rx) = client(session, 1);
        let id = only.id;
        hub.register(only);

        hub.unregister(id);

        assert_eq!(hub.room_size(session), 0);
        assert!(hub.room_members(session).is_empty());
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn broadcasts_stay_in_their_room() {
        let hub = Hub::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (in_a, mut in_a_rx) = client(a, 8);
        let (in_b, mut in_b_rx) = client(b, 8);
        hub.register(in_a);
        hub.register(in_b);

        hub.broadcast_to_room(a, &Envelope::bare(EventKind::NewItem));

        assert_eq!(kinds(&mut in_a_rx), vec![EventKind::NewItem]);
        assert!(kinds(&mut in_b_rx).is_empty());
    }

    #[test]
    fn slow_consumer_is_dropped_and_announced() {
        let hub = Hub::new();
        let session = Uuid::new_v4();
        let (fast, mut fast_rx) = client(session, 64);
        let (slow, mut slow_rx) = client(session, 1);
        let slow_id = slow.id;
        hub.register(fast);
        hub.register(slow);
        kinds(&mut fast_rx);

        for _ in 0..3 {
            hub.broadcast_to_room(session, &Envelope::bare(EventKind::UpdateItem));
        }

        assert!(!hub.is_registered(slow_id));
        assert_eq!(hub.room_size(session), 1);
        assert_eq!(
            kinds(&mut fast_rx),
            vec![
                EventKind::UpdateItem,
                EventKind::UpdateItem,
                EventKind::UserLeft,
                EventKind::UpdateItem
            ]
        );
        assert_eq!(kinds(&mut slow_rx), vec![EventKind::UpdateItem]);
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(!hub.unregister(slow_id));
    }

    #[test]
    fn room_members_lists_connected_users() {
        let hub = Hub::new();
        let session = Uuid::new_v4();
        let (first, _first_rx) = client(session, 8);
        let user_id = first.user_id;
        hub.register(first);

        let members = hub.room_members(session);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, user_id);
        assert_eq!(members[0].name, "Ada");
    }
}
