//! Per-session membership lists with non-blocking delivery.
//!
//! Both the duplex hub and the push-stream fan-out are built on [`Rooms`]. Mutating or
//! enumerating one room holds that room's shard lock, so a delivery never observes a
//! half-applied join or leave.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// One endpoint registered in a room.
pub struct Member<T> {
    /// Connection or subscription identifier, unique across rooms.
    pub id: Uuid,
    /// Bounded queue drained by the endpoint's writer.
    pub tx: mpsc::Sender<T>,
}

/// Rooms keyed by session id. A room only exists while it has at least one member.
pub struct Rooms<T> {
    rooms: DashMap<Uuid, Vec<Member<T>>>,
}

impl<T> Default for Rooms<T> {
    fn default() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }
}

impl<T: Clone> Rooms<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member` to `room`, first delivering `announce` to the members already present.
    ///
    /// Returns the ids of members dropped because their queue was full or closed.
    pub fn join(&self, room: Uuid, member: Member<T>, announce: Option<&T>) -> Vec<Uuid> {
        let mut members = self.rooms.entry(room).or_default();
        let dropped = match announce {
            Some(message) => deliver_locked(&mut members, message),
            None => Vec::new(),
        };
        members.push(member);
        dropped
    }

    /// Remove `member_id` from `room`, deleting the room when it becomes empty.
    ///
    /// Returns `false` when the member was not present.
    pub fn leave(&self, room: Uuid, member_id: Uuid) -> bool {
        let removed = match self.rooms.get_mut(&room) {
            Some(mut members) => {
                let before = members.len();
                members.retain(|member| member.id != member_id);
                members.len() != before
            }
            None => false,
        };
        self.rooms.remove_if(&room, |_, members| members.is_empty());
        removed
    }

    /// Offer `message` to every member of `room` without waiting on any of them.
    ///
    /// Members whose queue is full or closed are removed (closing their queue) and their ids
    /// returned.
    pub fn deliver(&self, room: Uuid, message: &T) -> Vec<Uuid> {
        let dropped = match self.rooms.get_mut(&room) {
            Some(mut members) => deliver_locked(&mut members, message),
            None => return Vec::new(),
        };
        if !dropped.is_empty() {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
        dropped
    }

    /// Number of members currently in `room`.
    pub fn len(&self, room: Uuid) -> usize {
        self.rooms.get(&room).map_or(0, |members| members.len())
    }

    /// Whether `room` currently exists.
    pub fn contains(&self, room: Uuid) -> bool {
        self.rooms.contains_key(&room)
    }

    /// Number of members across every room.
    pub fn total(&self) -> usize {
        self.rooms.iter().map(|members| members.len()).sum()
    }

    /// Ids of the members currently in `room`, in join order.
    pub fn member_ids(&self, room: Uuid) -> Vec<Uuid> {
        self.rooms
            .get(&room)
            .map(|members| members.iter().map(|member| member.id).collect())
            .unwrap_or_default()
    }
}

fn deliver_locked<T: Clone>(members: &mut Vec<Member<T>>, message: &T) -> Vec<Uuid> {
    let mut dropped = Vec::new();
    members.retain(|member| match member.tx.try_send(message.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
            dropped.push(member.id);
            false
        }
    });
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(capacity: usize) -> (Member<u32>, mpsc::Receiver<u32>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Member {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    #[test]
    fn join_announces_only_to_existing_members() {
        let rooms = Rooms::new();
        let room = Uuid::new_v4();
        let (first, mut first_rx) = member(4);
        let (second, mut second_rx) = member(4);

        rooms.join(room, first, Some(&1));
        rooms.join(room, second, Some(&2));

        assert_eq!(first_rx.try_recv().unwrap(), 2);
        assert!(first_rx.try_recv().is_err());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn deliver_is_scoped_to_the_room() {
        let rooms = Rooms::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (in_a, mut in_a_rx) = member(4);
        let (in_b, mut in_b_rx) = member(4);
        rooms.join(a, in_a, None);
        rooms.join(b, in_b, None);

        rooms.deliver(a, &7);

        assert_eq!(in_a_rx.try_recv().unwrap(), 7);
        assert!(in_b_rx.try_recv().is_err());
    }

    #[test]
    fn full_member_is_dropped_and_its_queue_closed() {
        let rooms = Rooms::new();
        let room = Uuid::new_v4();
        let (slow, mut slow_rx) = member(1);
        let slow_id = slow.id;
        let (fast, mut fast_rx) = member(8);
        rooms.join(room, slow, None);
        rooms.join(room, fast, None);

        assert!(rooms.deliver(room, &1).is_empty());
        assert_eq!(rooms.deliver(room, &2), vec![slow_id]);
        assert!(rooms.deliver(room, &3).is_empty());

        assert_eq!(rooms.len(room), 1);
        assert_eq!(slow_rx.try_recv().unwrap(), 1);
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        let received: Vec<u32> = std::iter::from_fn(|| fast_rx.try_recv().ok()).collect();
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[test]
    fn leaving_last_member_removes_room() {
        let rooms = Rooms::new();
        let room = Uuid::new_v4();
        let (only, _rx) = member(1);
        let id = only.id;
        rooms.join(room, only, None);

        assert!(rooms.leave(room, id));
        assert!(!rooms.contains(room));
        assert!(!rooms.leave(room, id));
    }
}
