use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        retro::{ActionItemSummary, GroupSummary, ItemSummary, SessionSummary},
        sse::ServerEvent,
        ws::{
            ActionItemData, BlurData, DeleteActionItemData, DeleteGroupData, DeleteItemData,
            Envelope, EventKind, GroupVoteData, ItemVoteData, ItemsMergedData, NewGroupData,
            NewItemData, UpdateRetrospectiveData,
        },
    },
    state::AppState,
};

/// Broadcast a freshly posted item.
pub fn broadcast_new_item(state: &AppState, item: ItemSummary, actor: Uuid) {
    let session_id = item.retrospective_id;
    publish(state, session_id, EventKind::NewItem, &NewItemData { item }, Some(actor));
}

/// Broadcast the removal of an item.
pub fn broadcast_item_deleted(state: &AppState, session_id: Uuid, item_id: Uuid, actor: Uuid) {
    publish(
        state,
        session_id,
        EventKind::DeleteItem,
        &DeleteItemData { item_id },
        Some(actor),
    );
}

/// Broadcast an item vote toggle as `vote_item` or `unvote_item`.
pub fn broadcast_item_vote(
    state: &AppState,
    session_id: Uuid,
    payload: ItemVoteData,
    voted: bool,
) {
    let kind = if voted {
        EventKind::VoteItem
    } else {
        EventKind::UnvoteItem
    };
    let actor = payload.user_id;
    publish(state, session_id, kind, &payload, Some(actor));
}

/// Broadcast the result of a merge.
pub fn broadcast_items_merged(
    state: &AppState,
    source_item_id: Uuid,
    item: ItemSummary,
    actor: Uuid,
) {
    let session_id = item.retrospective_id;
    let payload = ItemsMergedData {
        source_item_id,
        target_item_id: item.id,
        item,
    };
    publish(state, session_id, EventKind::ItemsMerged, &payload, Some(actor));
}

/// Broadcast a new group as `new_group`.
pub fn broadcast_group_created(state: &AppState, group: GroupSummary) {
    let session_id = group.retrospective_id;
    let actor = group.created_by;
    publish(state, session_id, EventKind::NewGroup, &NewGroupData { group }, Some(actor));
}

/// Broadcast a group vote toggle as `vote_group` or `unvote_group`.
pub fn broadcast_group_vote(
    state: &AppState,
    session_id: Uuid,
    payload: GroupVoteData,
    voted: bool,
) {
    let kind = if voted {
        EventKind::VoteGroup
    } else {
        EventKind::UnvoteGroup
    };
    let actor = payload.user_id;
    publish(state, session_id, kind, &payload, Some(actor));
}

/// Broadcast a removed group as `delete_group`.
pub fn broadcast_group_deleted(state: &AppState, session_id: Uuid, group_id: Uuid, actor: Uuid) {
    publish(
        state,
        session_id,
        EventKind::DeleteGroup,
        &DeleteGroupData { group_id },
        Some(actor),
    );
}

/// Broadcast a created (`new_action_item`) or updated (`update_action_item`) action item.
pub fn broadcast_action_item(
    state: &AppState,
    action_item: ActionItemSummary,
    created: bool,
    actor: Uuid,
) {
    let kind = if created {
        EventKind::NewActionItem
    } else {
        EventKind::UpdateActionItem
    };
    let session_id = action_item.retrospective_id;
    publish(state, session_id, kind, &ActionItemData { action_item }, Some(actor));
}

/// Broadcast a removed action item as `delete_action_item`.
pub fn broadcast_action_item_deleted(
    state: &AppState,
    session_id: Uuid,
    action_item_id: Uuid,
    actor: Uuid,
) {
    publish(
        state,
        session_id,
        EventKind::DeleteActionItem,
        &DeleteActionItemData { action_item_id },
        Some(actor),
    );
}

/// Broadcast a session snapshot after a lifecycle change, an edit or a registration.
pub fn broadcast_session_updated(
    state: &AppState,
    retrospective: SessionSummary,
    participant_count: Option<usize>,
    actor: Option<Uuid>,
) {
    let session_id = retrospective.id;
    let payload = UpdateRetrospectiveData {
        retrospective,
        participant_count,
        deleted: false,
    };
    publish(state, session_id, EventKind::UpdateRetrospective, &payload, actor);
}

/// Broadcast the final snapshot of a deleted session.
pub fn broadcast_session_deleted(state: &AppState, retrospective: SessionSummary, actor: Uuid) {
    let session_id = retrospective.id;
    let payload = UpdateRetrospectiveData {
        retrospective,
        participant_count: None,
        deleted: true,
    };
    publish(
        state,
        session_id,
        EventKind::UpdateRetrospective,
        &payload,
        Some(actor),
    );
}

/// Broadcast a blur flag change.
pub fn broadcast_blur(state: &AppState, session_id: Uuid, blurred: bool, actor: Uuid) {
    publish(
        state,
        session_id,
        EventKind::BlurToggled,
        &BlurData { blurred },
        Some(actor),
    );
}

/// Serialise one envelope and hand it to both the duplex room and the push-stream subscribers.
fn publish<T: Serialize>(
    state: &AppState,
    session_id: Uuid,
    kind: EventKind,
    payload: &T,
    actor: Option<Uuid>,
) {
    let envelope = match Envelope::new(kind, payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, kind = ?kind, "failed to encode realtime payload");
            return;
        }
    };
    let envelope = match actor {
        Some(user_id) => envelope.with_user(user_id),
        None => envelope,
    };

    match serde_json::to_string(&envelope) {
        Ok(text) => {
            let frame: std::sync::Arc<str> = text.into();
            state.hub().broadcast_frame(session_id, frame.clone());
            state
                .fanout()
                .broadcast(session_id, &ServerEvent::message(frame));
            debug!(session = %session_id, kind = ?kind, "realtime event published");
        }
        Err(err) => warn!(error = %err, kind = ?kind, "failed to serialise realtime envelope"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        services::auth_service::JwtVerifier,
        state::{SharedState, hub::ClientHandle},
    };

    fn state() -> SharedState {
        AppState::new(AppConfig::default(), Arc::new(JwtVerifier::new(b"k")))
    }

    #[test]
    fn one_event_reaches_both_paths_of_the_owning_session() {
        let state = state();
        let session = Uuid::new_v4();
        let (tx, mut ws_rx) = mpsc::channel(4);
        state.hub().register(ClientHandle {
            id: Uuid::new_v4(),
            session_id: session,
            user_id: Uuid::new_v4(),
            name: "Grace".into(),
            tx,
        });
        let mut subscription = state.fanout().subscribe(session);
        let mut elsewhere = state.fanout().subscribe(Uuid::new_v4());

        let actor = Uuid::new_v4();
        broadcast_blur(&state, session, true, actor);

        let frame = ws_rx.try_recv().unwrap();
        let event = subscription.receiver.try_recv().unwrap();
        assert_eq!(&*frame, &*event.data);
        assert!(ws_rx.try_recv().is_err());
        assert!(elsewhere.receiver.try_recv().is_err());

        let envelope = Envelope::from_json_str(&frame).unwrap();
        assert_eq!(envelope.kind, EventKind::BlurToggled);
        assert_eq!(envelope.user_id, Some(actor));
    }

    #[test]
    fn vote_kind_follows_the_toggle_direction() {
        let state = state();
        let session = Uuid::new_v4();
        let mut subscription = state.fanout().subscribe(session);
        let payload = |votes| GroupVoteData {
            group_id: Uuid::nil(),
            user_id: Uuid::nil(),
            votes,
        };

        broadcast_group_vote(&state, session, payload(1), true);
        broadcast_group_vote(&state, session, payload(0), false);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| subscription.receiver.try_recv().ok())
            .map(|event| Envelope::from_json_str(&event.data).unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::VoteGroup, EventKind::UnvoteGroup]);
    }
}
