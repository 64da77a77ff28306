//! Sentinel-returning wrapper for callers written against the nil/-1
//! contract.
//!
//! Every error is logged and collapsed: object-returning operations give
//! `None`, delete gives `0` on success, the storage status on rejection and
//! `-1` when the request never got an answer. A client whose initialization
//! failed stays usable in that it fails every call the same way.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;
use tracing::error;

use fdfs_common::object::{AttributeSet, ObjectId, ObjectInfo};

use crate::config::ClientConfig;
use crate::error::FacadeError;
use crate::facade::FileClient;

static SHARED: OnceCell<SentinelClient> = OnceCell::const_new();

/// The process-wide client, initialized from `FDFS_CLIENT_CONFIG` on first
/// use and kept for the life of the process.
pub async fn shared() -> &'static SentinelClient {
    SHARED.get_or_init(SentinelClient::from_env).await
}

pub struct SentinelClient {
    inner: Option<FileClient>,
}

fn collapse<T>(op: &'static str, result: Result<T, FacadeError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(op, error = %e, "FastDFS operation failed");
            None
        }
    }
}

impl SentinelClient {
    pub async fn initialize(config: &ClientConfig) -> Self {
        match FileClient::connect(config).await {
            Ok(client) => Self::from_client(client),
            Err(e) => {
                error!(error = %e, "FastDFS client initialization failed");
                Self { inner: None }
            }
        }
    }

    pub async fn from_env() -> Self {
        match ClientConfig::from_env() {
            Ok(config) => Self::initialize(&config).await,
            Err(e) => {
                error!(error = %format!("{:#}", e), "FastDFS client configuration failed");
                Self { inner: None }
            }
        }
    }

    pub fn from_client(client: FileClient) -> Self {
        Self {
            inner: Some(client),
        }
    }

    /// Whether initialization produced a usable connection.
    pub fn is_ready(&self) -> bool {
        self.inner.is_some()
    }

    fn client(&self, op: &'static str) -> Result<&FileClient, FacadeError> {
        self.inner.as_ref().ok_or_else(|| {
            FacadeError::ConnectionUnavailable(format!("{} called before a successful initialization", op))
        })
    }

    pub async fn upload_file<R>(&self, content: Option<R>, file_name: &str) -> Option<ObjectId>
    where
        R: AsyncRead + Unpin,
    {
        let result = match self.client("upload") {
            Ok(client) => client.upload(content, file_name).await,
            Err(e) => Err(e),
        };
        collapse("upload", result)
    }

    pub async fn upload_path(&self, path: &Path, file_name: &str) -> Option<ObjectId> {
        let result = match self.client("upload") {
            Ok(client) => client.upload_path(path, file_name).await,
            Err(e) => Err(e),
        };
        collapse("upload", result)
    }

    pub async fn get_file_info(&self, group: Option<&str>, path: &str) -> Option<ObjectInfo> {
        let id = ObjectId::new(group, path);
        let result = match self.client("get_info") {
            Ok(client) => client.get_info(&id).await,
            Err(e) => Err(e),
        };
        collapse("get_info", result)
    }

    pub async fn get_metadata(&self, group: Option<&str>, path: &str) -> Option<AttributeSet> {
        let id = ObjectId::new(group, path);
        let result = match self.client("get_metadata") {
            Ok(client) => client.get_metadata(&id).await,
            Err(e) => Err(e),
        };
        collapse("get_metadata", result)
    }

    pub async fn download_file(&self, group: Option<&str>, path: &str) -> Option<Cursor<Bytes>> {
        let id = ObjectId::new(group, path);
        let result = match self.client("download") {
            Ok(client) => client.download_reader(&id).await,
            Err(e) => Err(e),
        };
        collapse("download", result)
    }

    pub async fn delete_file(&self, group: Option<&str>, path: &str) -> i32 {
        let id = ObjectId::new(group, path);
        let result = match self.client("delete") {
            Ok(client) => client.delete(&id).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => 0,
            Err(e) => {
                error!(op = "delete", error = %e, "FastDFS operation failed");
                e.result_code()
            }
        }
    }

    /// Upload the replacement, then delete the old object. `None` when
    /// either step fails, including when the replacement was left orphaned.
    pub async fn modify_file(
        &self,
        old_group: Option<&str>,
        old_path: &str,
        content: Option<Bytes>,
        new_name: &str,
    ) -> Option<ObjectId> {
        let client = collapse("modify", self.client("modify"))?;
        let old = ObjectId::new(old_group, old_path);
        match client.modify(&old, content, new_name).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(op = "modify", error = %e, orphan = ?e.orphan(), "FastDFS operation failed");
                None
            }
        }
    }

    pub async fn modify_path(
        &self,
        old_group: Option<&str>,
        old_path: &str,
        path: &Path,
        new_name: &str,
    ) -> Option<ObjectId> {
        let client = collapse("modify", self.client("modify"))?;
        let old = ObjectId::new(old_group, old_path);
        match client.modify_path(&old, path, new_name).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(op = "modify", error = %e, orphan = ?e.orphan(), "FastDFS operation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::memory::MemoryBackend;
    use crate::session::Session;

    fn ready(backend: Arc<MemoryBackend>) -> SentinelClient {
        SentinelClient::from_client(FileClient::new(Session::with_backend(backend)))
    }

    #[tokio::test]
    async fn test_failed_init_collapses_every_call() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = SentinelClient::initialize(&ClientConfig::new(vec![addr])).await;
        assert!(!client.is_ready());
        assert!(client.upload_file(Some(&b"abc"[..]), "a.txt").await.is_none());
        assert!(client.get_file_info(None, "M00/00/00/a.txt").await.is_none());
        assert!(client.get_metadata(None, "M00/00/00/a.txt").await.is_none());
        assert!(client.download_file(None, "M00/00/00/a.txt").await.is_none());
        assert_eq!(client.delete_file(None, "M00/00/00/a.txt").await, -1);
        assert!(client
            .modify_file(None, "M00/00/00/a.txt", Some(Bytes::from("b")), "b.txt")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_result_codes() {
        let client = ready(Arc::new(MemoryBackend::new()));
        let id = client.upload_file(Some(&b"abc"[..]), "a.txt").await.unwrap();

        assert_eq!(client.delete_file(Some(&id.group), &id.path).await, 0);
        assert_eq!(client.delete_file(None, &id.path).await, 2);
    }

    #[tokio::test]
    async fn test_group_defaults_to_group1() {
        let client = ready(Arc::new(MemoryBackend::new()));
        let id = client.upload_file(Some(&b"abc"[..]), "a.txt").await.unwrap();
        assert_eq!(id.group, "group1");

        let info = client.get_file_info(None, &id.path).await.unwrap();
        assert_eq!(info.file_size, 3);
        let meta = client.get_metadata(None, &id.path).await.unwrap();
        assert_eq!(meta[0].value, "a.txt");
    }

    #[tokio::test]
    async fn test_modify_orphan_collapses_to_none() {
        let backend = Arc::new(MemoryBackend::new());
        let client = ready(backend.clone());
        let old = client.upload_file(Some(&b"old"[..]), "old.txt").await.unwrap();

        backend.fail_removes(true);
        let result = client
            .modify_file(Some(&old.group), &old.path, Some(Bytes::from("new")), "new.txt")
            .await;
        assert!(result.is_none());
        assert_eq!(backend.len().await, 2);
    }
}
