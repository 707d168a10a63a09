use std::convert::Infallible;

use axum::{
    Router,
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;

use crate::{
    error::AppError,
    routes::auth::{StreamQuery, admit},
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/retrospective",
    tag = "realtime",
    params(StreamQuery),
    responses(
        (status = 200, description = "Session event stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Malformed retrospective id"),
        (status = 401, description = "Missing or invalid token")
    )
)]
/// Stream the session's realtime events, starting with `connected`.
pub async fn retrospective_stream(
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (user, session_id) = admit(&state, &query)?;
    Ok(sse_service::open_stream(&state, session_id, user))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/retrospective", get(retrospective_stream))
}
