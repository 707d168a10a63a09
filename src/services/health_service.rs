use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report storage health alongside the live connection counters, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded(),
        state.hub().connection_count(),
        state.fanout().total_subscribers(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::retro_store::MemoryRetroStore,
        services::auth_service::JwtVerifier,
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(JwtVerifier::new(b"k")));
        assert_eq!(health_status(&state).await.status, "degraded");

        state.install_store(Arc::new(MemoryRetroStore::new())).await;
        let _subscription = state.fanout().subscribe(Uuid::new_v4());

        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 0);
        assert_eq!(health.subscribers, 1);
    }
}
