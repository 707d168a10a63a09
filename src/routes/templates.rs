use axum::{Json, Router, extract::Path, routing::get};

use crate::{
    dto::retro::TemplateSummary, error::AppError, services::template_service,
    state::SharedState,
};

/// Every board layout.
#[utoipa::path(
    get,
    path = "/templates",
    tag = "templates",
    responses((status = 200, description = "Available board layouts", body = [TemplateSummary]))
)]
pub async fn list_templates() -> Json<Vec<TemplateSummary>> {
    Json(template_service::templates())
}

/// One board layout by id.
#[utoipa::path(
    get,
    path = "/templates/{id}",
    tag = "templates",
    params(("id" = String, Path, description = "Template identifier, e.g. `4ls`")),
    responses(
        (status = 200, description = "Board layout", body = TemplateSummary),
        (status = 404, description = "Unknown template")
    )
)]
pub async fn get_template(Path(id): Path<String>) -> Result<Json<TemplateSummary>, AppError> {
    Ok(Json(template_service::template(&id)?))
}

/// Template catalogue, readable without credentials.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/templates", get(list_templates))
        .route("/templates/{id}", get(get_template))
}
