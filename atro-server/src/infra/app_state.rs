use std::{fmt, sync::Arc};

use atro_config::Config;
use atro_core::{
    EventBus,
    cache::ContextCache,
    classifier::Analyzer,
    store::EventStore,
    supervisor::{Supervisor, SupervisorConfig},
};

use crate::infra::websocket::ConnectionManager;

/// Everything a request or socket handler needs, cloned per handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn EventStore>,
    pub cache: Arc<dyn ContextCache>,
    pub supervisor: Supervisor,
    pub analyzer: Arc<Analyzer>,
    pub bus: EventBus,
    pub websocket_manager: Arc<ConnectionManager>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store.backend())
            .field("cache", &self.cache.health())
            .field("clients", &self.websocket_manager.connection_count())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the supervisor to the given backends. The caller keeps the
    /// receiving end of `bus` and hands it to the broadcaster.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn EventStore>,
        cache: Arc<dyn ContextCache>,
        analyzer: Analyzer,
        bus: EventBus,
    ) -> Self {
        let supervisor = Supervisor::new(
            SupervisorConfig::from_config(&config),
            Arc::clone(&store),
            Arc::clone(&cache),
            bus.clone(),
        );
        Self {
            config,
            store,
            cache,
            supervisor,
            analyzer: Arc::new(analyzer),
            bus,
            websocket_manager: Arc::new(ConnectionManager::new()),
        }
    }
}
