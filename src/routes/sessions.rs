use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::retro::{
        ActionItemSummary, AddItemRequest, BlurRequest, BlurResponse, CreateActionItemRequest,
        CreateGroupRequest, CreateRetrospectiveRequest, GroupSummary, ItemSummary,
        MergeItemsRequest, ParticipantsResponse, SessionDetails, SessionSummary,
        UpdateActionItemRequest, UpdateRetrospectiveRequest, VoteResponse,
    },
    error::AppError,
    routes::auth::AuthUser,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle and board endpoints. Every route requires a bearer token.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/retrospectives", get(list_sessions).post(create_session))
        .route(
            "/retrospectives/{id}",
            get(get_session).put(update_session).delete(delete_session),
        )
        .route("/retrospectives/{id}/start", post(start_session))
        .route("/retrospectives/{id}/end", post(end_session))
        .route("/retrospectives/{id}/reopen", post(reopen_session))
        .route("/retrospectives/{id}/join", post(join_session))
        .route("/retrospectives/{id}/participants", get(list_participants))
        .route("/retrospectives/{id}/items", post(add_item))
        .route("/retrospectives/{id}/merge-items", post(merge_items))
        .route("/retrospectives/{id}/groups", post(create_group))
        .route("/retrospectives/{id}/action-items", post(add_action_item))
        .route("/retrospectives/{id}/blur", put(set_blur))
        .route("/retrospectives/items/{item_id}", delete(delete_item))
        .route("/retrospectives/items/{item_id}/vote", post(vote_item))
        .route("/retrospectives/groups/{group_id}", delete(delete_group))
        .route("/retrospectives/groups/{group_id}/vote", post(vote_group))
        .route(
            "/retrospectives/action-items/{action_item_id}",
            put(update_action_item).delete(delete_action_item),
        )
}

/// Create a planned session owned by the caller.
#[utoipa::path(
    post,
    path = "/retrospectives",
    tag = "retrospectives",
    request_body = CreateRetrospectiveRequest,
    responses(
        (status = 201, description = "Session created", body = SessionSummary),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Valid(Json(payload)): Valid<Json<CreateRetrospectiveRequest>>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let session = session_service::create_session(&state, user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Sessions the caller created or joined. Planned sessions are only listed for their creator.
#[utoipa::path(
    get,
    path = "/retrospectives",
    tag = "retrospectives",
    responses((status = 200, description = "Visible sessions", body = [SessionSummary]))
)]
pub async fn list_sessions(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    Ok(Json(
        session_service::list_sessions(&state, user.user_id).await?,
    ))
}

/// Full board of a session.
#[utoipa::path(
    get,
    path = "/retrospectives/{id}",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session board", body = SessionDetails),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetails>, AppError> {
    Ok(Json(session_service::session_details(&state, id).await?))
}

/// Edit the title, description or schedule of a session (creator only).
#[utoipa::path(
    put,
    path = "/retrospectives/{id}",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = UpdateRetrospectiveRequest,
    responses(
        (status = 200, description = "Session updated", body = SessionSummary),
        (status = 403, description = "Not the creator, or the session is closed")
    )
)]
pub async fn update_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateRetrospectiveRequest>>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(
        session_service::update_session(&state, id, user.user_id, payload).await?,
    ))
}

/// Delete a session and its board (creator only).
#[utoipa::path(
    delete,
    path = "/retrospectives/{id}",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 403, description = "Not the creator, or the session is closed")
    )
)]
pub async fn delete_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::delete_session(&state, id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start a planned session. Only the creator may do so.
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/start",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session active", body = SessionSummary),
        (status = 403, description = "Not the creator"),
        (status = 409, description = "Transition not allowed from the current status")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(
        session_service::start_session(&state, id, user.user_id).await?,
    ))
}

/// Close an active session (creator only).
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/end",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session closed", body = SessionSummary),
        (status = 403, description = "Not the creator"),
        (status = 409, description = "Transition not allowed from the current status")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(
        session_service::end_session(&state, id, user.user_id).await?,
    ))
}

/// Reopen a closed session (creator only).
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/reopen",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session active again", body = SessionSummary),
        (status = 403, description = "Not the creator"),
        (status = 409, description = "Session is not closed")
    )
)]
pub async fn reopen_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(
        session_service::reopen_session(&state, id, user.user_id).await?,
    ))
}

/// Register the caller as a participant; the second participant activates a planned session.
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/join",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Caller registered", body = SessionSummary),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(
        session_service::register_participant(&state, id, user.user_id).await?,
    ))
}

/// Participants registered in a session.
#[utoipa::path(
    get,
    path = "/retrospectives/{id}/participants",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Registered participants", body = ParticipantsResponse))
)]
pub async fn list_participants(
    State(state): State<SharedState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    Ok(Json(session_service::list_participants(&state, id).await?))
}

/// Post an item under one of the template categories.
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/items",
    tag = "items",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = AddItemRequest,
    responses(
        (status = 201, description = "Item posted", body = ItemSummary),
        (status = 400, description = "Unknown category"),
        (status = 403, description = "Session is closed")
    )
)]
pub async fn add_item(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AddItemRequest>>,
) -> Result<(StatusCode, Json<ItemSummary>), AppError> {
    let item = session_service::add_item(&state, id, user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Delete an item (author or session creator).
#[utoipa::path(
    delete,
    path = "/retrospectives/items/{item_id}",
    tag = "items",
    params(("item_id" = Uuid, Path, description = "Item identifier")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 403, description = "Neither the author nor the session creator")
    )
)]
pub async fn delete_item(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::delete_item(&state, item_id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Toggle the caller's vote on an item.
#[utoipa::path(
    post,
    path = "/retrospectives/items/{item_id}/vote",
    tag = "items",
    params(("item_id" = Uuid, Path, description = "Item identifier")),
    responses(
        (status = 200, description = "Vote toggled", body = VoteResponse),
        (status = 403, description = "Session is closed")
    )
)]
pub async fn vote_item(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<VoteResponse>, AppError> {
    Ok(Json(
        session_service::vote_item(&state, item_id, user.user_id).await?,
    ))
}

/// Fold the source item into the target; both must share a category of an active session.
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/merge-items",
    tag = "items",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = MergeItemsRequest,
    responses(
        (status = 200, description = "Merged target item", body = ItemSummary),
        (status = 400, description = "Same item twice or items of another session"),
        (status = 409, description = "Category mismatch or session not active")
    )
)]
pub async fn merge_items(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MergeItemsRequest>,
) -> Result<Json<ItemSummary>, AppError> {
    Ok(Json(
        session_service::merge_items(&state, id, user.user_id, payload).await?,
    ))
}

/// Group existing items of an active session.
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/groups",
    tag = "groups",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = GroupSummary),
        (status = 404, description = "One of the items does not exist"),
        (status = 409, description = "Session not active")
    )
)]
pub async fn create_group(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreateGroupRequest>>,
) -> Result<(StatusCode, Json<GroupSummary>), AppError> {
    let group = session_service::create_group(&state, id, user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// Toggle the caller's vote on a group.
#[utoipa::path(
    post,
    path = "/retrospectives/groups/{group_id}/vote",
    tag = "groups",
    params(("group_id" = Uuid, Path, description = "Group identifier")),
    responses(
        (status = 200, description = "Vote toggled", body = VoteResponse),
        (status = 403, description = "Session is closed")
    )
)]
pub async fn vote_group(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<VoteResponse>, AppError> {
    Ok(Json(
        session_service::vote_group(&state, group_id, user.user_id).await?,
    ))
}

/// Delete a group (its creator only).
#[utoipa::path(
    delete,
    path = "/retrospectives/groups/{group_id}",
    tag = "groups",
    params(("group_id" = Uuid, Path, description = "Group identifier")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 403, description = "Not the group creator")
    )
)]
pub async fn delete_group(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::delete_group(&state, group_id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record an action item.
#[utoipa::path(
    post,
    path = "/retrospectives/{id}/action-items",
    tag = "action-items",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = CreateActionItemRequest,
    responses(
        (status = 201, description = "Action item created", body = ActionItemSummary),
        (status = 403, description = "Session is closed")
    )
)]
pub async fn add_action_item(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreateActionItemRequest>>,
) -> Result<(StatusCode, Json<ActionItemSummary>), AppError> {
    let action = session_service::add_action_item(&state, id, user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// Edit an action item. Allowed to its creator and to the session creator.
#[utoipa::path(
    put,
    path = "/retrospectives/action-items/{action_item_id}",
    tag = "action-items",
    params(("action_item_id" = Uuid, Path, description = "Action item identifier")),
    request_body = UpdateActionItemRequest,
    responses(
        (status = 200, description = "Action item updated", body = ActionItemSummary),
        (status = 403, description = "Not allowed, or the session is closed")
    )
)]
pub async fn update_action_item(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(action_item_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateActionItemRequest>>,
) -> Result<Json<ActionItemSummary>, AppError> {
    Ok(Json(
        session_service::update_action_item(&state, action_item_id, user.user_id, payload)
            .await?,
    ))
}

/// Delete an action item.
#[utoipa::path(
    delete,
    path = "/retrospectives/action-items/{action_item_id}",
    tag = "action-items",
    params(("action_item_id" = Uuid, Path, description = "Action item identifier")),
    responses(
        (status = 204, description = "Action item deleted"),
        (status = 403, description = "Not allowed, or the session is closed")
    )
)]
pub async fn delete_action_item(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(action_item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::delete_action_item(&state, action_item_id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Hide or reveal item contents for every participant. Creator only.
#[utoipa::path(
    put,
    path = "/retrospectives/{id}/blur",
    tag = "retrospectives",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = BlurRequest,
    responses(
        (status = 200, description = "Blur flag updated", body = BlurResponse),
        (status = 403, description = "Not the creator")
    )
)]
pub async fn set_blur(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BlurRequest>,
) -> Result<Json<BlurResponse>, AppError> {
    Ok(Json(
        session_service::set_blur(&state, id, user.user_id, payload.blurred).await?,
    ))
}
