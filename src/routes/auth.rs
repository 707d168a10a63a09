use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::{AppError, ServiceError},
    services::auth_service::{AuthError, AuthenticatedUser, bearer_token},
    state::SharedState,
};

/// Caller identity taken from the `Authorization: Bearer` header.
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let user = bearer_token(&parts.headers)
            .and_then(|token| state.verifier().verify(token))
            .map_err(rejection)?;
        Ok(AuthUser(user))
    }
}

/// Query string of the realtime endpoints, which cannot carry headers from a browser.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Bearer token.
    pub token: Option<String>,
    /// Session to attach to.
    pub retrospective_id: Option<String>,
}

/// Admit a realtime client: the token is checked before the session id is parsed.
pub fn admit(
    state: &SharedState,
    query: &StreamQuery,
) -> Result<(AuthenticatedUser, Uuid), AppError> {
    let token = query
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| rejection(AuthError::MissingToken))?;
    let user = state.verifier().verify(token).map_err(rejection)?;

    let session_id = query
        .retrospective_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| AppError::BadRequest("invalid retrospective id".into()))?;

    Ok((user, session_id))
}

fn rejection(err: AuthError) -> AppError {
    AppError::from(ServiceError::from(err))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, services::auth_service::JwtVerifier, state::AppState};

    fn setup() -> (SharedState, String, AuthenticatedUser) {
        let verifier = JwtVerifier::new(b"route-secret");
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "joan@example.com".into(),
            name: "Joan".into(),
        };
        let token = verifier.issue(&user).unwrap();
        let state = AppState::new(AppConfig::default(), Arc::new(verifier));
        (state, token, user)
    }

    #[test]
    fn missing_or_bad_token_is_rejected_before_the_session_id() {
        let (state, _, _) = setup();
        for token in [None, Some(String::new()), Some("garbage".to_string())] {
            let query = StreamQuery {
                token,
                retrospective_id: Some("not-a-uuid".into()),
            };
            assert!(matches!(
                admit(&state, &query),
                Err(AppError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn malformed_session_id_is_a_bad_request() {
        let (state, token, _) = setup();
        let query = StreamQuery {
            token: Some(token),
            retrospective_id: Some("not-a-uuid".into()),
        };
        assert!(matches!(admit(&state, &query), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn valid_query_yields_the_caller_and_session() {
        let (state, token, user) = setup();
        let session = Uuid::new_v4();
        let query = StreamQuery {
            token: Some(token),
            retrospective_id: Some(session.to_string()),
        };
        let (admitted, session_id) = admit(&state, &query).unwrap();
        assert_eq!(admitted.user_id, user.user_id);
        assert_eq!(session_id, session);
    }
}
