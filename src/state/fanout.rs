//! Push-stream fan-out scoped per session, plus the per-session blur flag.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    state::rooms::{Member, Rooms},
};

/// Queue handed to one push-stream subscriber.
pub struct Subscription {
    /// Subscriber id, used to unsubscribe.
    pub id: Uuid,
    /// Session the subscriber listens to.
    pub session_id: Uuid,
    /// Events queued for this subscriber.
    pub receiver: mpsc::Receiver<ServerEvent>,
}

/// Registry of push-stream subscribers keyed by session.
pub struct Fanout {
    rooms: Rooms<ServerEvent>,
    blur: DashMap<Uuid, bool>,
    capacity: usize,
}

impl Fanout {
    /// Create a fan-out whose subscriber queues hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Rooms::new(),
            blur: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Attach a new subscriber to the session.
    pub fn subscribe(&self, session_id: Uuid) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.rooms.join(session_id, Member { id, tx }, None);
        debug!(subscriber = %id, session = %session_id, "push-stream subscriber attached");
        Subscription {
            id,
            session_id,
            receiver,
        }
    }

    /// Detach a subscriber. Returns `false` when it had already been dropped.
    pub fn unsubscribe(&self, session_id: Uuid, subscriber_id: Uuid) -> bool {
        self.rooms.leave(session_id, subscriber_id)
    }

    /// Offer `event` to every subscriber of the session, dropping the ones that lag behind.
    pub fn broadcast(&self, session_id: Uuid, event: &ServerEvent) {
        for subscriber in self.rooms.deliver(session_id, event) {
            debug!(subscriber = %subscriber, session = %session_id, "dropping slow push-stream subscriber");
        }
    }

    /// Record the blur flag of a session.
    pub fn set_blur(&self, session_id: Uuid, blurred: bool) {
        if blurred {
            self.blur.insert(session_id, true);
        } else {
            self.blur.remove(&session_id);
        }
    }

    /// Whether the session board is currently blurred.
    pub fn is_blurred(&self, session_id: Uuid) -> bool {
        self.blur.get(&session_id).is_some_and(|flag| *flag)
    }

    /// Forget everything kept for a deleted session.
    pub fn forget_session(&self, session_id: Uuid) {
        self.blur.remove(&session_id);
    }

    /// Subscribers attached to the session.
    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.rooms.len(session_id)
    }

    /// Subscribers attached across every session.
    pub fn total_subscribers(&self) -> usize {
        self.rooms.total()
    }
}
