/// Bearer credential verification.
pub mod auth_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Realtime event publication to rooms and push streams.
pub mod realtime_events;
/// Session lifecycle, board mutations and participant registration.
pub mod session_service;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor with back-off and degraded mode.
pub mod storage_supervisor;
/// Board layout catalogue.
pub mod template_service;
/// WebSocket connection pumps.
pub mod websocket_service;
