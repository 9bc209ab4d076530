//! Application state shared across handlers.

use crate::coordinator::Coordinator;
use csvgate_core::config::AppConfig;
use csvgate_query::QueryExecutor;
use csvgate_storage::ArtifactStore;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<AppConfig>,
    /// Request coordinator owning the cache store and lease table.
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: AppConfig, store: ArtifactStore, executor: Arc<dyn QueryExecutor>) -> Self {
        let coordinator = Coordinator::new(store, executor, &config.cache);
        Self {
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
        }
    }
}
