use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Duplex connections currently registered in the hub.
    pub connections: usize,
    /// Push-stream subscribers currently attached.
    pub subscribers: usize,
}

impl HealthResponse {
    /// Build a response from the degraded flag and the live connection counters.
    pub fn new(degraded: bool, connections: usize, subscribers: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            connections,
            subscribers,
        }
    }
}
