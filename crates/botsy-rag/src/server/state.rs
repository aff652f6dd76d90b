//! Application state for the HTTP server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::engine::RagEngine;
use crate::error::Result;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<RagEngine>,
}

impl AppState {
    /// Build the engine from configuration
    pub async fn new(config: RagConfig) -> Result<Self> {
        let engine = RagEngine::new(config).await?;
        Ok(Self::from_engine(engine))
    }

    pub fn from_engine(engine: RagEngine) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &RagEngine {
        &self.inner
    }

    pub fn config(&self) -> &RagConfig {
        self.inner.config()
    }
}
