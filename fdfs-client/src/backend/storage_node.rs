//! Storage backend that talks the FastDFS protocol to one storage node.
//!
//! The node is chosen once by the tracker and kept for the lifetime of the
//! backend. Requests go over pooled connections, one connection per call.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use fdfs_common::object::{Attribute, AttributeSet, ObjectId, ObjectInfo};
use fdfs_common::{BackendError, StorageBackend};

use crate::config::ClientConfig;
use crate::pool::{ConnectionPool, PoolSettings};
use crate::protocol::{self, Command, StorageNode, FILE_INFO_BODY_LEN};
use crate::tracker::Tracker;

pub struct StorageNodeBackend {
    node: StorageNode,
    pool: ConnectionPool,
}

impl StorageNodeBackend {
    pub fn new(node: StorageNode, settings: PoolSettings) -> Self {
        let pool = ConnectionPool::new(node.addr(), settings);
        Self { node, pool }
    }

    /// Resolve a storage node through the configured trackers and bind to it.
    pub async fn discover(config: &ClientConfig) -> Result<Self, BackendError> {
        let tracker = Tracker::new(config);
        let node = tracker.query_store(config.store_group.as_deref()).await?;
        Ok(Self::new(node, PoolSettings::from_config(config)))
    }

    pub fn node(&self) -> &StorageNode {
        &self.node
    }

    async fn call(
        &self,
        cmd: Command,
        parts: &[&[u8]],
        expected_len: Option<usize>,
    ) -> Result<Bytes, BackendError> {
        let mut conn = self.pool.checkout().await?;
        let result = conn.request(cmd, parts, expected_len).await;
        match &result {
            Ok(_) => self.pool.release(conn).await,
            // The node answered with an errno; the stream is still in sync.
            Err(BackendError::Status { .. }) => self.pool.release(conn).await,
            Err(e) => debug!(addr = %conn.addr(), error = %e, "Discarding broken connection"),
        }
        result
    }

    async fn upload(&self, data: &Bytes, ext: &str) -> Result<ObjectId, BackendError> {
        let prefix = protocol::upload_prefix(self.node.store_path_index, ext, data.len());
        let reply = self
            .call(Command::UploadFile, &[&prefix[..], &data[..]], None)
            .await?;
        protocol::parse_upload_reply(&reply)
    }

    async fn set_metadata(&self, id: &ObjectId, attributes: &[Attribute]) -> Result<(), BackendError> {
        let packed = protocol::encode_metadata(attributes);
        let body = protocol::set_metadata_body(id, &packed)?;
        self.call(Command::SetMetadata, &[&body[..]], Some(0)).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for StorageNodeBackend {
    async fn store(
        &self,
        data: Bytes,
        ext: &str,
        attributes: &[Attribute],
    ) -> Result<ObjectId, BackendError> {
        let id = self.upload(&data, ext).await?;

        if !attributes.is_empty() {
            if let Err(e) = self.set_metadata(&id, attributes).await {
                warn!(file_id = %id, error = %e, "Setting metadata failed, removing upload");
                if let Err(cleanup) = self.remove(&id).await {
                    warn!(file_id = %id, error = %cleanup, "Cleanup of upload failed");
                }
                return Err(e);
            }
        }

        debug!(file_id = %id, size = data.len(), "Storage upload complete");
        Ok(id)
    }

    async fn fetch_info(&self, id: &ObjectId) -> Result<ObjectInfo, BackendError> {
        let body = protocol::object_body(id)?;
        let reply = self
            .call(Command::QueryFileInfo, &[&body[..]], Some(FILE_INFO_BODY_LEN))
            .await?;
        protocol::parse_file_info(&reply)
    }

    async fn fetch_metadata(&self, id: &ObjectId) -> Result<AttributeSet, BackendError> {
        let body = protocol::object_body(id)?;
        let reply = self.call(Command::GetMetadata, &[&body[..]], None).await?;
        Ok(protocol::decode_metadata(&reply))
    }

    async fn fetch_content(&self, id: &ObjectId) -> Result<Bytes, BackendError> {
        let body = protocol::download_body(id)?;
        self.call(Command::DownloadFile, &[&body[..]], None).await
    }

    async fn remove(&self, id: &ObjectId) -> Result<(), BackendError> {
        let body = protocol::object_body(id)?;
        self.call(Command::DeleteFile, &[&body[..]], Some(0)).await?;
        debug!(file_id = %id, "Storage delete complete");
        Ok(())
    }
}
