/// Entities shared by every storage backend.
pub mod models;
/// Session store abstraction and its backends.
pub mod retro_store;
/// Storage error types.
pub mod storage;
