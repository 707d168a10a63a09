//! Library crate for retro-live-back, exposing modules for binaries and integration tests.

pub mod config;
/// Persistence layer: entities, the store trait and its backends.
pub mod dao;
/// Payloads exchanged over HTTP, WebSocket and SSE.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic behind the routes and realtime transports.
pub mod services;
/// Shared application state and the realtime registries.
pub mod state;
