use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Registers the bearer JWT scheme used by every `/retrospectives` route.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Retro Live Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::get_session,
        crate::routes::sessions::update_session,
        crate::routes::sessions::delete_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::end_session,
        crate::routes::sessions::reopen_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::list_participants,
        crate::routes::sessions::add_item,
        crate::routes::sessions::delete_item,
        crate::routes::sessions::vote_item,
        crate::routes::sessions::merge_items,
        crate::routes::sessions::create_group,
        crate::routes::sessions::vote_group,
        crate::routes::sessions::delete_group,
        crate::routes::sessions::add_action_item,
        crate::routes::sessions::update_action_item,
        crate::routes::sessions::delete_action_item,
        crate::routes::sessions::set_blur,
        crate::routes::templates::list_templates,
        crate::routes::templates::get_template,
        crate::routes::sse::retrospective_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::websocket::connected_clients,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::retro::CreateRetrospectiveRequest,
            crate::dto::retro::UpdateRetrospectiveRequest,
            crate::dto::retro::AddItemRequest,
            crate::dto::retro::MergeItemsRequest,
            crate::dto::retro::CreateGroupRequest,
            crate::dto::retro::CreateActionItemRequest,
            crate::dto::retro::UpdateActionItemRequest,
            crate::dto::retro::BlurRequest,
            crate::dto::retro::BlurResponse,
            crate::dto::retro::SessionSummary,
            crate::dto::retro::SessionDetails,
            crate::dto::retro::ItemSummary,
            crate::dto::retro::GroupSummary,
            crate::dto::retro::ActionItemSummary,
            crate::dto::retro::ParticipantSummary,
            crate::dto::retro::ParticipantsResponse,
            crate::dto::retro::VoteResponse,
            crate::dto::retro::ConnectedClient,
            crate::dto::retro::ConnectedClientsResponse,
            crate::dto::retro::TemplateSummary,
            crate::dto::retro::CategorySummary,
            crate::dto::ws::UserJoinedData,
            crate::dto::ws::UserLeftData,
            crate::dto::ws::NewItemData,
            crate::dto::ws::DeleteItemData,
            crate::dto::ws::ItemVoteData,
            crate::dto::ws::ItemsMergedData,
            crate::dto::ws::NewGroupData,
            crate::dto::ws::GroupVoteData,
            crate::dto::ws::DeleteGroupData,
            crate::dto::ws::ActionItemData,
            crate::dto::ws::DeleteActionItemData,
            crate::dto::ws::UpdateRetrospectiveData,
            crate::dto::ws::ConnectedData,
            crate::dto::ws::BlurData,
            crate::dao::models::SessionStatus,
            crate::dao::models::SessionTemplate,
            crate::dao::models::ActionStatus,
        )
    ),
    modifiers(&BearerAuth),
    security(("bearer" = [])),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "retrospectives", description = "Session lifecycle and participants"),
        (name = "items", description = "Board items, votes and merges"),
        (name = "groups", description = "Item groups and their votes"),
        (name = "action-items", description = "Follow-up tasks"),
        (name = "templates", description = "Board layouts"),
        (name = "realtime", description = "WebSocket rooms and server-sent event streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_realtime_endpoints() {
        let doc = ApiDoc::openapi();
        for path in [
            "/retrospectives/{id}/merge-items",
            "/ws/retrospective",
            "/sse/retrospective",
            "/templates",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
