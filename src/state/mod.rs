pub mod fanout;
pub mod hub;
pub mod rooms;
/// Session lifecycle transitions.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::retro_store::RetroStore, error::ServiceError,
    services::auth_service::TokenVerifier,
};

pub use self::fanout::Fanout;
pub use self::hub::Hub;

/// Handle to the application state shared by every handler and task.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, realtime registries and credentials.
pub struct AppState {
    retro_store: RwLock<Option<Arc<dyn RetroStore>>>,
    degraded: watch::Sender<bool>,
    hub: Hub,
    fanout: Fanout,
    config: AppConfig,
    verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, verifier: Arc<dyn TokenVerifier>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            retro_store: RwLock::new(None),
            degraded: degraded_tx,
            hub: Hub::new(),
            fanout: Fanout::new(config.subscriber_queue_capacity),
            config,
            verifier,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn retro_store(&self) -> Option<Arc<dyn RetroStore>> {
        let guard = self.retro_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_store(&self) -> Result<Arc<dyn RetroStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.retro_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn RetroStore>) {
        {
            let mut guard = self.retro_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.retro_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Registry of live duplex connections.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Push-stream subscribers and blur flags.
    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    /// Realtime tunables.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Verifier used to admit requests and connections.
    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::retro_store::MemoryRetroStore, services::auth_service::JwtVerifier};

    #[tokio::test]
    async fn store_installation_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(JwtVerifier::new(b"k")));
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        state.install_store(Arc::new(MemoryRetroStore::new())).await;
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_store().await.is_ok());

        state.clear_store().await;
        assert!(state.is_degraded());
        assert!(state.retro_store().await.is_none());
    }
}
