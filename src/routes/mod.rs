use axum::Router;

use crate::state::SharedState;

/// Bearer authentication extractors.
pub mod auth;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Health check route.
pub mod health;
/// Retrospective REST routes.
pub mod sessions;
/// Push-stream route.
pub mod sse;
/// Board layout routes.
pub mod templates;
/// Duplex socket routes.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sessions::router())
        .merge(templates::router())
        .merge(sse::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
