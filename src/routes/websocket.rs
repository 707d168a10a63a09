use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::retro::ConnectedClientsResponse,
    error::AppError,
    routes::auth::{AuthUser, StreamQuery, admit},
    services::{session_service, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/retrospective",
    tag = "realtime",
    params(StreamQuery),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Malformed retrospective id"),
        (status = 401, description = "Missing or invalid token")
    )
)]
/// Admit the caller and upgrade the connection into a session room member.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let (user, session_id) = admit(&state, &query)?;
    info!(session = %session_id, user = %user.user_id, "websocket upgrade requested");

    let shared_state = state.clone();
    Ok(ws
        .max_message_size(state.config().max_message_size)
        .on_upgrade(move |socket| {
            websocket_service::handle_socket(shared_state, socket, session_id, user)
        }))
}

#[utoipa::path(
    get,
    path = "/ws/retrospective/{id}/participants",
    tag = "realtime",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Users connected to the session room", body = ConnectedClientsResponse))
)]
/// Users currently holding a live connection to the session.
pub async fn connected_clients(
    State(state): State<SharedState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> Json<ConnectedClientsResponse> {
    Json(session_service::connected_clients(&state, id))
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws/retrospective", get(ws_handler))
        .route(
            "/ws/retrospective/{id}/participants",
            get(connected_clients),
        )
}
