//! Application state shared across routes

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::coordinator::CoordinatorManager;
use crate::store::KvStore;
use crate::ws::RoomManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: KvStore,
    pub rooms: Arc<RoomManager>,
    pub coordinators: Arc<CoordinatorManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // The shared store every instance coordinates through
        let store = KvStore::new();

        // Process-wide identity used as lease owner: built exactly once here
        // and threaded through, never re-read from the environment.
        let instance_id = format!("{}:{}", config.region, Uuid::new_v4());

        let rooms = Arc::new(RoomManager::new(store.clone()));
        let coordinators = Arc::new(CoordinatorManager::new(store.clone(), instance_id));

        Self {
            config,
            store,
            rooms,
            coordinators,
        }
    }
}
