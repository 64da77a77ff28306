pub mod memory;
pub mod storage_node;

use std::sync::Arc;

use fdfs_common::{BackendError, StorageBackend};

use crate::config::{BackendKind, ClientConfig};

use self::memory::MemoryBackend;
use self::storage_node::StorageNodeBackend;

/// Construct the storage backend named by the configuration.
///
/// For FastDFS this performs discovery: the trackers are queried and the
/// returned storage node is bound for the lifetime of the backend.
pub async fn from_config(config: &ClientConfig) -> Result<Arc<dyn StorageBackend>, BackendError> {
    match config.backend {
        BackendKind::Fastdfs => Ok(Arc::new(StorageNodeBackend::discover(config).await?)),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}
