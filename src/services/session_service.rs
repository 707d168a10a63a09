//! Board mutations and lifecycle transitions of retrospective sessions.
//!
//! Every successful mutation publishes exactly one realtime event to the owning session.

use std::{sync::Arc, time::SystemTime};

use indexmap::IndexSet;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            ActionItemEntity, ActionStatus, GroupEntity, GroupOutcome, ItemEntity, MergeOutcome,
            SessionEntity, SessionStatus, StatusUpdate,
        },
        retro_store::RetroStore,
    },
    dto::{
        retro::{
            ActionItemSummary, AddItemRequest, BlurResponse, ConnectedClientsResponse,
            CreateActionItemRequest, CreateGroupRequest, CreateRetrospectiveRequest,
            GroupSummary, ItemSummary, MergeItemsRequest, ParticipantsResponse, SessionDetails,
            SessionSummary, UpdateActionItemRequest, UpdateRetrospectiveRequest, VoteResponse,
        },
        validation::parse_due_date,
        ws::{GroupVoteData, ItemVoteData},
    },
    error::ServiceError,
    services::realtime_events,
    state::{
        SharedState,
        state_machine::{SessionEvent, compute_transition},
    },
};

/// Conditional status writes retried when another request moved the session first.
const MAX_STATUS_ATTEMPTS: usize = 3;

/// Create a session in `planned` owned by `user_id`.
pub async fn create_session(
    state: &SharedState,
    user_id: Uuid,
    request: CreateRetrospectiveRequest,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();
    let session = SessionEntity {
        id: Uuid::new_v4(),
        title: request.title.trim().to_string(),
        description: request.description,
        template: request.template,
        status: SessionStatus::Planned,
        created_by: user_id,
        scheduled_at: request.scheduled_at.as_deref().map(parse_timestamp).transpose()?,
        started_at: None,
        ended_at: None,
        created_at: now,
        updated_at: now,
    };
    store.insert_session(session.clone()).await?;
    info!(session = %session.id, user = %user_id, template = session.template.as_str(), "retrospective created");

    let summary = SessionSummary::from(session);
    realtime_events::broadcast_session_updated(state, summary.clone(), None, Some(user_id));
    Ok(summary)
}

/// Sessions created or joined by `user_id`; planned sessions are only listed to their creator.
pub async fn list_sessions(
    state: &SharedState,
    user_id: Uuid,
) -> Result<Vec<SessionSummary>, ServiceError> {
    let store = state.require_store().await?;
    Ok(store
        .list_sessions(user_id)
        .await?
        .into_iter()
        .filter(|session| session.status != SessionStatus::Planned || session.created_by == user_id)
        .map(SessionSummary::from)
        .collect())
}

/// Full board of a session.
pub async fn session_details(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionDetails, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;

    let items = store.list_items(session_id).await?;
    let groups = store.list_groups(session_id).await?;
    let action_items = store.list_action_items(session_id).await?;
    let participants = store.list_participants(session_id).await?;

    Ok(SessionDetails {
        retrospective: session.into(),
        items: items.into_iter().map(Into::into).collect(),
        groups: groups.into_iter().map(Into::into).collect(),
        action_items: action_items.into_iter().map(Into::into).collect(),
        participants: participants.into_iter().map(Into::into).collect(),
        blurred: state.fanout().is_blurred(session_id),
    })
}

/// Edit the title, description and schedule of a session.
pub async fn update_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    request: UpdateRetrospectiveRequest,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_store().await?;
    let mut session = load_session(&store, session_id).await?;
    ensure_creator(&session, user_id, "update")?;
    ensure_open(&session)?;

    session.title = request.title.trim().to_string();
    session.description = request.description;
    session.scheduled_at = request
        .scheduled_at
        .as_deref()
        .map(parse_timestamp)
        .transpose()?;
    session.updated_at = SystemTime::now();

    if !store.update_session(session.clone()).await? {
        return Err(session_not_found(session_id));
    }

    let summary = SessionSummary::from(session);
    realtime_events::broadcast_session_updated(state, summary.clone(), None, Some(user_id));
    Ok(summary)
}

/// Delete a session and everything on its board.
pub async fn delete_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_creator(&session, user_id, "delete")?;
    ensure_open(&session)?;

    if !store.delete_session(session_id).await? {
        return Err(session_not_found(session_id));
    }
    state.fanout().forget_session(session_id);
    info!(session = %session_id, user = %user_id, "retrospective deleted");

    realtime_events::broadcast_session_deleted(state, session.into(), user_id);
    Ok(())
}

/// Creator starts the session.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    transition(state, session_id, user_id, SessionEvent::Start).await
}

/// Creator ends the session.
pub async fn end_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    transition(state, session_id, user_id, SessionEvent::End).await
}

/// Creator reopens a closed session.
pub async fn reopen_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    transition(state, session_id, user_id, SessionEvent::Reopen).await
}

async fn transition(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    event: SessionEvent,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_store().await?;

    for _ in 0..MAX_STATUS_ATTEMPTS {
        let session = load_session(&store, session_id).await?;
        ensure_creator(&session, user_id, &event.to_string())?;
        let next = compute_transition(session.status, event)?;

        match store
            .update_session_status(session_id, session.status, next, SystemTime::now())
            .await?
        {
            StatusUpdate::Updated(updated) => {
                info!(session = %session_id, from = %session.status, to = %next, %event, "retrospective status changed");
                let summary = SessionSummary::from(updated);
                realtime_events::broadcast_session_updated(
                    state,
                    summary.clone(),
                    None,
                    Some(user_id),
                );
                return Ok(summary);
            }
            StatusUpdate::Stale(current) => {
                debug!(session = %session_id, expected = %session.status, %current, "status changed concurrently; retrying");
            }
            StatusUpdate::Missing => return Err(session_not_found(session_id)),
        }
    }

    Err(ServiceError::InvalidState(
        "retrospective status changed concurrently".into(),
    ))
}

/// Record `user_id` as a participant, activating a planned session once two users joined.
pub async fn register_participant(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;

    let count = store
        .upsert_participant(session_id, user_id, SystemTime::now())
        .await?;
    let mut session = load_session(&store, session_id).await?;

    if session.status == SessionStatus::Planned && count >= 2 {
        let next = compute_transition(session.status, SessionEvent::AutoActivate)?;
        match store
            .update_session_status(session_id, SessionStatus::Planned, next, SystemTime::now())
            .await?
        {
            StatusUpdate::Updated(updated) => {
                info!(session = %session_id, participants = count, "retrospective auto-activated");
                session = updated;
            }
            StatusUpdate::Stale(_) => session = load_session(&store, session_id).await?,
            StatusUpdate::Missing => return Err(session_not_found(session_id)),
        }
    }

    let summary = SessionSummary::from(session);
    realtime_events::broadcast_session_updated(state, summary.clone(), Some(count), Some(user_id));
    Ok(summary)
}

/// Registered participants of a session.
pub async fn list_participants(
    state: &SharedState,
    session_id: Uuid,
) -> Result<ParticipantsResponse, ServiceError> {
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;
    let participants: Vec<_> = store
        .list_participants(session_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(ParticipantsResponse {
        count: participants.len(),
        participants,
    })
}

/// Users with a live duplex connection to the session.
pub fn connected_clients(state: &SharedState, session_id: Uuid) -> ConnectedClientsResponse {
    let participants = state.hub().room_members(session_id);
    ConnectedClientsResponse {
        count: participants.len(),
        participants,
    }
}

/// Post an item under one of the session template's categories.
pub async fn add_item(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    request: AddItemRequest,
) -> Result<ItemSummary, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_open(&session)?;
    if !session.template.has_category(&request.category) {
        return Err(ServiceError::InvalidInput(format!(
            "category `{}` is not part of the `{}` template",
            request.category,
            session.template.as_str()
        )));
    }

    let now = SystemTime::now();
    let item = ItemEntity {
        id: Uuid::new_v4(),
        session_id,
        category: request.category,
        content: request.content,
        author_id: (!request.is_anonymous).then_some(user_id),
        is_anonymous: request.is_anonymous,
        votes: 0,
        created_at: now,
        updated_at: now,
    };
    store.insert_item(item.clone()).await?;

    let summary = ItemSummary::from(item);
    realtime_events::broadcast_new_item(state, summary.clone(), user_id);
    Ok(summary)
}

/// Delete an item; allowed to its author and to the session creator.
pub async fn delete_item(
    state: &SharedState,
    item_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let item = load_item(&store, item_id).await?;
    let session = load_session(&store, item.session_id).await?;
    ensure_open(&session)?;
    if item.author_id != Some(user_id) && session.created_by != user_id {
        return Err(ServiceError::Forbidden(
            "only the author or the retrospective creator can delete this item".into(),
        ));
    }

    if !store.delete_item(item_id).await? {
        return Err(item_not_found(item_id));
    }

    realtime_events::broadcast_item_deleted(state, session.id, item_id, user_id);
    Ok(())
}

/// Toggle the vote of `user_id` on an item.
pub async fn vote_item(
    state: &SharedState,
    item_id: Uuid,
    user_id: Uuid,
) -> Result<VoteResponse, ServiceError> {
    let store = state.require_store().await?;
    let item = load_item(&store, item_id).await?;
    let session = load_session(&store, item.session_id).await?;
    ensure_open(&session)?;

    let toggle = store
        .toggle_item_vote(item_id, user_id)
        .await?
        .ok_or_else(|| item_not_found(item_id))?;

    realtime_events::broadcast_item_vote(
        state,
        session.id,
        ItemVoteData {
            item_id,
            user_id,
            votes: toggle.votes,
        },
        toggle.voted,
    );
    Ok(VoteResponse {
        voted: toggle.voted,
        votes: toggle.votes,
    })
}

/// Fold the source item into the target item.
pub async fn merge_items(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    request: MergeItemsRequest,
) -> Result<ItemSummary, ServiceError> {
    let MergeItemsRequest {
        source_item_id,
        target_item_id,
    } = request;
    if source_item_id == target_item_id {
        return Err(ServiceError::InvalidInput(
            "an item cannot be merged into itself".into(),
        ));
    }

    let store = state.require_store().await?;
    let source = load_item(&store, source_item_id).await?;
    let target = load_item(&store, target_item_id).await?;
    if source.session_id != target.session_id || source.session_id != session_id {
        return Err(ServiceError::InvalidInput(
            "items must belong to the same retrospective".into(),
        ));
    }
    if source.category != target.category {
        return Err(ServiceError::InvalidState(
            "items must share the same category to be merged".into(),
        ));
    }

    let session = load_session(&store, session_id).await?;
    ensure_active(&session, "merge items")?;

    let merged = match store
        .merge_items(source_item_id, target_item_id, SystemTime::now())
        .await?
    {
        MergeOutcome::Merged(item) => item,
        MergeOutcome::Missing(id) => return Err(item_not_found(id)),
    };
    info!(session = %session_id, source = %source_item_id, target = %target_item_id, "items merged");

    let summary = ItemSummary::from(merged);
    realtime_events::broadcast_items_merged(state, source_item_id, summary.clone(), user_id);
    Ok(summary)
}

/// Cluster existing items of an active session under a name.
pub async fn create_group(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    request: CreateGroupRequest,
) -> Result<GroupSummary, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_active(&session, "create groups")?;

    let item_ids: IndexSet<Uuid> = request.item_ids.into_iter().collect();
    let now = SystemTime::now();
    let group = GroupEntity {
        id: Uuid::new_v4(),
        session_id,
        name: request.name.trim().to_string(),
        description: request.description,
        item_ids: item_ids.into_iter().collect(),
        votes: 0,
        created_by: user_id,
        created_at: now,
        updated_at: now,
    };

    let group = match store.create_group(group).await? {
        GroupOutcome::Created(group) => group,
        GroupOutcome::MissingItem(id) => return Err(item_not_found(id)),
        GroupOutcome::ForeignItem(id) => {
            return Err(ServiceError::InvalidInput(format!(
                "item `{id}` does not belong to this retrospective"
            )));
        }
    };

    let summary = GroupSummary::from(group);
    realtime_events::broadcast_group_created(state, summary.clone());
    Ok(summary)
}

/// Toggle the vote of `user_id` on a group.
pub async fn vote_group(
    state: &SharedState,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<VoteResponse, ServiceError> {
    let store = state.require_store().await?;
    let group = load_group(&store, group_id).await?;
    let session = load_session(&store, group.session_id).await?;
    ensure_open(&session)?;

    let toggle = store
        .toggle_group_vote(group_id, user_id)
        .await?
        .ok_or_else(|| group_not_found(group_id))?;

    realtime_events::broadcast_group_vote(
        state,
        session.id,
        GroupVoteData {
            group_id,
            user_id,
            votes: toggle.votes,
        },
        toggle.voted,
    );
    Ok(VoteResponse {
        voted: toggle.voted,
        votes: toggle.votes,
    })
}

/// Delete a group; only its creator may.
pub async fn delete_group(
    state: &SharedState,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let group = load_group(&store, group_id).await?;
    if group.created_by != user_id {
        return Err(ServiceError::Forbidden(
            "only the group creator can delete it".into(),
        ));
    }
    let session = load_session(&store, group.session_id).await?;
    ensure_open(&session)?;

    if !store.delete_group(group_id).await? {
        return Err(group_not_found(group_id));
    }

    realtime_events::broadcast_group_deleted(state, session.id, group_id, user_id);
    Ok(())
}

/// Record a follow-up task, optionally linked to an item of the same session.
pub async fn add_action_item(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    request: CreateActionItemRequest,
) -> Result<ActionItemSummary, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_open(&session)?;

    if let Some(item_id) = request.item_id {
        let item = load_item(&store, item_id).await?;
        if item.session_id != session_id {
            return Err(ServiceError::InvalidInput(format!(
                "item `{item_id}` does not belong to this retrospective"
            )));
        }
    }

    let now = SystemTime::now();
    let action = ActionItemEntity {
        id: Uuid::new_v4(),
        session_id,
        item_id: request.item_id,
        title: request.title.trim().to_string(),
        description: request.description,
        status: ActionStatus::Todo,
        assigned_to: request.assigned_to,
        due_date: request.due_date.as_deref().map(due_date).transpose()?,
        completed_at: None,
        created_by: user_id,
        created_at: now,
        updated_at: now,
    };
    store.insert_action_item(action.clone()).await?;

    let summary = ActionItemSummary::from(action);
    realtime_events::broadcast_action_item(state, summary.clone(), true, user_id);
    Ok(summary)
}

/// Apply a partial update to an action item.
///
/// Entering `done` stamps `completed_at`, leaving it clears the stamp.
pub async fn update_action_item(
    state: &SharedState,
    action_item_id: Uuid,
    user_id: Uuid,
    request: UpdateActionItemRequest,
) -> Result<ActionItemSummary, ServiceError> {
    let store = state.require_store().await?;
    let mut action = load_action_item(&store, action_item_id).await?;
    let session = load_session(&store, action.session_id).await?;
    ensure_action_editor(&action, &session, user_id)?;
    ensure_open(&session)?;

    let now = SystemTime::now();
    if let Some(title) = request.title {
        action.title = title.trim().to_string();
    }
    if let Some(description) = request.description {
        action.description = Some(description);
    }
    if let Some(assigned_to) = request.assigned_to {
        action.assigned_to = Some(assigned_to);
    }
    if let Some(raw) = request.due_date.as_deref() {
        action.due_date = Some(due_date(raw)?);
    }
    if let Some(raw) = request.status.as_deref() {
        let status: ActionStatus = raw.parse().map_err(ServiceError::InvalidInput)?;
        match (action.status, status) {
            (ActionStatus::Done, ActionStatus::Done) => {}
            (_, ActionStatus::Done) => action.completed_at = Some(now),
            (_, _) => action.completed_at = None,
        }
        action.status = status;
    }
    action.updated_at = now;

    if !store.update_action_item(action.clone()).await? {
        return Err(action_item_not_found(action_item_id));
    }

    let summary = ActionItemSummary::from(action);
    realtime_events::broadcast_action_item(state, summary.clone(), false, user_id);
    Ok(summary)
}

/// Delete an action item; allowed to its creator and to the session creator.
pub async fn delete_action_item(
    state: &SharedState,
    action_item_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let action = load_action_item(&store, action_item_id).await?;
    let session = load_session(&store, action.session_id).await?;
    ensure_action_editor(&action, &session, user_id)?;
    ensure_open(&session)?;

    if !store.delete_action_item(action_item_id).await? {
        return Err(action_item_not_found(action_item_id));
    }

    realtime_events::broadcast_action_item_deleted(state, session.id, action_item_id, user_id);
    Ok(())
}

/// Creator toggles blurring of the board for every viewer.
pub async fn set_blur(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    blurred: bool,
) -> Result<BlurResponse, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    ensure_creator(&session, user_id, "blur")?;

    state.fanout().set_blur(session_id, blurred);
    realtime_events::broadcast_blur(state, session_id, blurred, user_id);
    Ok(BlurResponse { blurred })
}

async fn load_session(
    store: &Arc<dyn RetroStore>,
    id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    store
        .find_session(id)
        .await?
        .ok_or_else(|| session_not_found(id))
}

async fn load_item(store: &Arc<dyn RetroStore>, id: Uuid) -> Result<ItemEntity, ServiceError> {
    store.find_item(id).await?.ok_or_else(|| item_not_found(id))
}

async fn load_group(store: &Arc<dyn RetroStore>, id: Uuid) -> Result<GroupEntity, ServiceError> {
    store
        .find_group(id)
        .await?
        .ok_or_else(|| group_not_found(id))
}

async fn load_action_item(
    store: &Arc<dyn RetroStore>,
    id: Uuid,
) -> Result<ActionItemEntity, ServiceError> {
    store
        .find_action_item(id)
        .await?
        .ok_or_else(|| action_item_not_found(id))
}

fn ensure_creator(
    session: &SessionEntity,
    user_id: Uuid,
    action: &str,
) -> Result<(), ServiceError> {
    if session.created_by != user_id {
        return Err(ServiceError::Forbidden(format!(
            "only the retrospective creator can {action} it"
        )));
    }
    Ok(())
}

fn ensure_action_editor(
    action: &ActionItemEntity,
    session: &SessionEntity,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    if action.created_by != user_id && session.created_by != user_id {
        return Err(ServiceError::Forbidden(
            "only the action item creator or the retrospective creator can change it".into(),
        ));
    }
    Ok(())
}

fn ensure_open(session: &SessionEntity) -> Result<(), ServiceError> {
    if session.status == SessionStatus::Closed {
        return Err(ServiceError::SessionClosed);
    }
    Ok(())
}

fn ensure_active(session: &SessionEntity, operation: &str) -> Result<(), ServiceError> {
    match session.status {
        SessionStatus::Active => Ok(()),
        SessionStatus::Closed => Err(ServiceError::SessionClosed),
        SessionStatus::Planned => Err(ServiceError::InvalidState(format!(
            "can only {operation} in active retrospectives"
        ))),
    }
}

fn parse_timestamp(raw: &str) -> Result<SystemTime, ServiceError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map(SystemTime::from)
        .map_err(|_| ServiceError::InvalidInput(format!("invalid timestamp `{raw}`")))
}

fn due_date(raw: &str) -> Result<time::Date, ServiceError> {
    parse_due_date(raw)
        .ok_or_else(|| ServiceError::InvalidInput("invalid due_date format".into()))
}

fn session_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("retrospective `{id}` not found"))
}

fn item_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("item `{id}` not found"))
}

fn group_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("group `{id}` not found"))
}

fn action_item_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("action item `{id}` not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::SessionTemplate, retro_store::MemoryRetroStore},
        services::auth_service::JwtVerifier,
        state::AppState,
    };

    async fn state() -> SharedState {
        let state = AppState::new(AppConfig::default(), Arc::new(JwtVerifier::new(b"k")));
        state.install_store(Arc::new(MemoryRetroStore::new())).await;
        state
    }

    async fn planned(state: &SharedState, creator: Uuid) -> SessionSummary {
        create_session(
            state,
            creator,
            CreateRetrospectiveRequest {
                title: "Sprint 42".into(),
                description: None,
                template: SessionTemplate::StartStopContinue,
                scheduled_at: None,
            },
        )
        .await
        .unwrap()
    }

    async fn active(state: &SharedState, creator: Uuid) -> SessionSummary {
        let session = planned(state, creator).await;
        start_session(state, session.id, creator).await.unwrap()
    }

    async fn item(state: &SharedState, session_id: Uuid, user: Uuid, content: &str) -> ItemSummary {
        add_item(
            state,
            session_id,
            user,
            AddItemRequest {
                category: "start".into(),
                content: content.into(),
                is_anonymous: false,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn second_participant_activates_a_planned_session() {
        let state = state().await;
        let (creator, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let session = planned(&state, creator).await;

        let after_first = register_participant(&state, session.id, creator).await.unwrap();
        assert_eq!(after_first.status, SessionStatus::Planned);
        let again = register_participant(&state, session.id, creator).await.unwrap();
        assert_eq!(again.status, SessionStatus::Planned);

        let after_second = register_participant(&state, session.id, guest).await.unwrap();
        assert_eq!(after_second.status, SessionStatus::Active);
        assert!(after_second.started_at.is_some());
    }

    #[tokio::test]
    async fn registration_does_not_touch_closed_sessions() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;
        end_session(&state, session.id, creator).await.unwrap();

        register_participant(&state, session.id, creator).await.unwrap();
        let after = register_participant(&state, session.id, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(after.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn lifecycle_is_creator_only() {
        let state = state().await;
        let (creator, other) = (Uuid::new_v4(), Uuid::new_v4());
        let session = planned(&state, creator).await;

        for result in [
            start_session(&state, session.id, other).await,
            end_session(&state, session.id, other).await,
            reopen_session(&state, session.id, other).await,
        ] {
            assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        }
        assert!(matches!(
            delete_session(&state, session.id, other).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn reopen_requires_a_closed_session() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;

        assert!(matches!(
            reopen_session(&state, session.id, creator).await,
            Err(ServiceError::InvalidState(_))
        ));

        let closed = end_session(&state, session.id, creator).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert!(closed.ended_at.is_some());

        let reopened = reopen_session(&state, session.id, creator).await.unwrap();
        assert_eq!(reopened.status, SessionStatus::Active);
        assert!(reopened.ended_at.is_none());
    }

    #[tokio::test]
    async fn planned_session_cannot_be_ended() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = planned(&state, creator).await;

        assert!(matches!(
            end_session(&state, session.id, creator).await,
            Err(ServiceError::InvalidState(_))
        ));
        let details = session_details(&state, session.id).await.unwrap();
        assert_eq!(details.retrospective.status, SessionStatus::Planned);
        assert!(details.retrospective.ended_at.is_none());
    }

    #[tokio::test]
    async fn items_are_checked_against_the_template() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;

        let err = add_item(
            &state,
            session.id,
            creator,
            AddItemRequest {
                category: "glad".into(),
                content: "nope".into(),
                is_anonymous: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn anonymous_items_have_no_author() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;

        let item = add_item(
            &state,
            session.id,
            creator,
            AddItemRequest {
                category: "stop".into(),
                content: "long meetings".into(),
                is_anonymous: true,
            },
        )
        .await
        .unwrap();
        assert!(item.author_id.is_none());
        assert!(item.is_anonymous);
    }

    #[tokio::test]
    async fn vote_toggle_pair_restores_the_count() {
        let state = state().await;
        let (creator, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let session = active(&state, creator).await;
        let item = item(&state, session.id, creator, "pairing").await;

        let first = vote_item(&state, item.id, voter).await.unwrap();
        assert!(first.voted);
        assert_eq!(first.votes, 1);
        let second = vote_item(&state, item.id, voter).await.unwrap();
        assert!(!second.voted);
        assert_eq!(second.votes, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_do_not_lose_votes() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;
        let item_id = item(&state, session.id, creator, "pairing").await.id;
        let voters: Vec<Uuid> = (0..64).map(|_| Uuid::new_v4()).collect();

        let toggle_all = |voters: Vec<Uuid>| {
            let handles: Vec<_> = voters
                .into_iter()
                .map(|voter| {
                    let state = state.clone();
                    tokio::spawn(async move { vote_item(&state, item_id, voter).await })
                })
                .collect();
            futures::future::join_all(handles)
        };

        for outcome in toggle_all(voters.clone()).await {
            assert!(outcome.unwrap().unwrap().voted);
        }
        let store = state.require_store().await.unwrap();
        assert_eq!(store.find_item(item_id).await.unwrap().unwrap().votes, 64);

        // Half of the voters withdraw at once.
        for outcome in toggle_all(voters[..32].to_vec()).await {
            assert!(!outcome.unwrap().unwrap().voted);
        }
        assert_eq!(store.find_item(item_id).await.unwrap().unwrap().votes, 32);
    }

    #[tokio::test]
    async fn merge_rejections_leave_items_untouched() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;
        let other_session = active(&state, creator).await;
        let a = item(&state, session.id, creator, "A").await;
        let b = item(&state, other_session.id, creator, "B").await;
        let c = add_item(
            &state,
            session.id,
            creator,
            AddItemRequest {
                category: "stop".into(),
                content: "C".into(),
                is_anonymous: false,
            },
        )
        .await
        .unwrap();

        let merge = |source: Uuid, target: Uuid| MergeItemsRequest {
            source_item_id: source,
            target_item_id: target,
        };
        assert!(matches!(
            merge_items(&state, session.id, creator, merge(a.id, a.id)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            merge_items(&state, session.id, creator, merge(b.id, a.id)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            merge_items(&state, session.id, creator, merge(c.id, a.id)).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            merge_items(&state, session.id, creator, merge(Uuid::new_v4(), a.id)).await,
            Err(ServiceError::NotFound(_))
        ));

        let store = state.require_store().await.unwrap();
        assert_eq!(store.find_item(a.id).await.unwrap().unwrap().content, "A");
        assert_eq!(store.find_item(b.id).await.unwrap().unwrap().content, "B");
        assert_eq!(store.find_item(c.id).await.unwrap().unwrap().content, "C");
    }

    #[tokio::test]
    async fn merge_concatenates_and_resets_votes() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;
        let source = item(&state, session.id, creator, "more pairing").await;
        let target = item(&state, session.id, creator, "pairing").await;
        vote_item(&state, target.id, creator).await.unwrap();
        vote_item(&state, source.id, creator).await.unwrap();

        let merged = merge_items(
            &state,
            session.id,
            creator,
            MergeItemsRequest {
                source_item_id: source.id,
                target_item_id: target.id,
            },
        )
        .await
        .unwrap();

        assert_eq!(merged.id, target.id);
        assert_eq!(merged.content, "pairing | more pairing");
        assert_eq!(merged.votes, 0);
        let store = state.require_store().await.unwrap();
        assert!(store.find_item(source.id).await.unwrap().is_none());

        let revote = vote_item(&state, target.id, creator).await.unwrap();
        assert!(revote.voted);
        assert_eq!(revote.votes, 1);
    }

    #[tokio::test]
    async fn groups_require_an_active_session_and_known_items() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = planned(&state, creator).await;
        let request = |item_ids| CreateGroupRequest {
            name: "Process".into(),
            description: None,
            item_ids,
        };

        assert!(matches!(
            create_group(&state, session.id, creator, request(vec![])).await,
            Err(ServiceError::InvalidState(_))
        ));

        start_session(&state, session.id, creator).await.unwrap();
        let known = item(&state, session.id, creator, "X").await;
        let missing = Uuid::new_v4();
        match create_group(&state, session.id, creator, request(vec![known.id, missing])).await {
            Err(ServiceError::NotFound(message)) => assert!(message.contains(&missing.to_string())),
            other => panic!("unexpected result: {other:?}"),
        }

        let group = create_group(&state, session.id, creator, request(vec![known.id, known.id]))
            .await
            .unwrap();
        assert_eq!(group.item_ids, vec![known.id]);
    }

    #[tokio::test]
    async fn closed_sessions_reject_board_mutations() {
        let state = state().await;
        let creator = Uuid::new_v4();
        let session = active(&state, creator).await;
        let item = item(&state, session.id, creator, "X").await;
        let group = create_group(
            &state,
            session.id,
            creator,
            CreateGroupRequest {
                name: "G".into(),
                description: None,
                item_ids: vec![item.id],
            },
        )
        .await
        .unwrap();
        end_session(&state, session.id, creator).await.unwrap();

        assert!(matches!(
            vote_item(&state, item.id, creator).await,
            Err(ServiceError::SessionClosed)
        ));
        assert!(matches!(
            vote_group(&state, group.id, creator).await,
            Err(ServiceError::SessionClosed)
        ));
        assert!(matches!(
            delete_item(&state, item.id, creator).await,
            Err(ServiceError::SessionClosed)
        ));
        assert!(matches!(
            delete_session(&state, session.id, creator).await,
            Err(ServiceError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn group_deletion_is_reserved_to_its_creator() {
        let state = state().await;
        let (creator, other) = (Uuid::new_v4(), Uuid::new_v4());
        let session = active(&state, creator).await;
        let group = create_group(
            &state,
            session.id,
            other,
            CreateGroupRequest {
                name: "G".into(),
                description: None,
                item_ids: vec![],
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            delete_group(&state, group.id, creator).await,
            Err(ServiceError::Forbidden(_))
        ));
        delete_group(&state, group.id, other).await.unwrap();
        assert!(matches!(
            vote_group(&state, group.id, other).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn completed_at_follows_the_done_status() {
        let state = state().await;
        let (creator, stranger) = (Uuid::new_v4(), Uuid::new_v4());
        let session = active(&state, creator).await;
        let action = add_action_item(
            &state,
            session.id,
            creator,
            CreateActionItemRequest {
                item_id: None,
                title: "Book a room".into(),
                description: None,
                assigned_to: None,
                due_date: Some("2024-06-30".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(action.due_date.as_deref(), Some("2024-06-30"));

        let update = |status: &str| UpdateActionItemRequest {
            title: None,
            description: None,
            status: Some(status.into()),
            assigned_to: None,
            due_date: None,
        };
        assert!(matches!(
            update_action_item(&state, action.id, stranger, update("done")).await,
            Err(ServiceError::Forbidden(_))
        ));

        let done = update_action_item(&state, action.id, creator, update("done"))
            .await
            .unwrap();
        assert_eq!(done.status, ActionStatus::Done);
        assert!(done.completed_at.is_some());

        let reopened = update_action_item(&state, action.id, creator, update("in_progress"))
            .await
            .unwrap();
        assert!(reopened.completed_at.is_none());

        assert!(matches!(
            update_action_item(&state, action.id, creator, update("blocked")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn blur_is_creator_only_and_reported_in_details() {
        let state = state().await;
        let (creator, other) = (Uuid::new_v4(), Uuid::new_v4());
        let session = active(&state, creator).await;

        assert!(matches!(
            set_blur(&state, session.id, other, true).await,
            Err(ServiceError::Forbidden(_))
        ));
        set_blur(&state, session.id, creator, true).await.unwrap();
        assert!(session_details(&state, session.id).await.unwrap().blurred);
    }

    #[tokio::test]
    async fn planned_sessions_are_listed_to_their_creator_only() {
        let state = state().await;
        let (creator, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let session = planned(&state, creator).await;
        register_participant(&state, session.id, guest).await.unwrap();

        assert_eq!(list_sessions(&state, creator).await.unwrap().len(), 1);
        assert!(list_sessions(&state, guest).await.unwrap().is_empty());
    }
}
