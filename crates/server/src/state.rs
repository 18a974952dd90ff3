use std::sync::Arc;

use anteroom_core::{
    Authenticator, Config, QueueManager, QueueNotifier, QueueStore, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    store: Arc<dyn QueueStore>,
    manager: Arc<QueueManager>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn QueueStore>,
        manager: Arc<QueueManager>,
    ) -> Self {
        Self {
            config,
            authenticator,
            store,
            manager,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<QueueManager> {
        &self.manager
    }

    pub fn notifier(&self) -> &Arc<QueueNotifier> {
        self.manager.notifier()
    }
}
