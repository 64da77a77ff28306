use std::sync::Arc;

use tracing::info;

use fdfs_common::StorageBackend;

use crate::backend;
use crate::config::ClientConfig;
use crate::error::InitError;

/// A live handle to the storage tier.
///
/// Created once and shared by cloning; every clone talks to the same bound
/// storage node. There is no explicit teardown: pooled connections close
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn StorageBackend>,
}

impl Session {
    /// Validate the configuration, discover a storage node and bind to it.
    /// No retry happens here: a failure is returned to the caller as is.
    pub async fn initialize(config: &ClientConfig) -> Result<Self, InitError> {
        config
            .validate()
            .map_err(|e| InitError::Config(format!("{:#}", e)))?;
        let backend = backend::from_config(config)
            .await
            .map_err(InitError::Discovery)?;
        info!(backend = ?config.backend, "Storage session established");
        Ok(Self { backend })
    }

    /// Load the configuration from `FDFS_CLIENT_CONFIG` and initialize.
    pub async fn from_env() -> Result<Self, InitError> {
        let config = ClientConfig::from_env().map_err(|e| InitError::Config(format!("{:#}", e)))?;
        Self::initialize(&config).await
    }

    /// Wrap an already constructed backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}
