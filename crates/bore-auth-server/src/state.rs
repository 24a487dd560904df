//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::decision::DecisionEngine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Auth decisions and the login flow.
    pub engine: Arc<DecisionEngine>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: ServerConfig, engine: DecisionEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}
