use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use fdfs_common::object::{file_ext, upload_attributes, AttributeSet, ObjectId, ObjectInfo};
use fdfs_common::BackendError;

use crate::config::ClientConfig;
use crate::error::{FacadeError, InitError};
use crate::modify::{self, ModifyError, OrphanPolicy};
use crate::session::Session;

/// Upload, read, delete and replace objects through one [`Session`].
///
/// Cloning is cheap and every clone shares the session. Operations run on
/// the caller's task; nothing is spawned.
#[derive(Clone)]
pub struct FileClient {
    session: Session,
    orphan_policy: OrphanPolicy,
}

impl FileClient {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            orphan_policy: OrphanPolicy::default(),
        }
    }

    /// Initialize a session from `config` and apply its orphan policy.
    pub async fn connect(config: &ClientConfig) -> Result<Self, InitError> {
        let session = Session::initialize(config).await?;
        Ok(Self::new(session).with_orphan_policy(config.on_orphan))
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read `content` to the end and upload it.
    ///
    /// `None` uploads an empty object with no attributes. Otherwise the
    /// object gets `file_name` and `file_length` attributes, in that order.
    pub async fn upload<R>(&self, content: Option<R>, file_name: &str) -> Result<ObjectId, FacadeError>
    where
        R: AsyncRead + Unpin,
    {
        let data = match content {
            Some(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| FacadeError::from_backend("upload", BackendError::Io(e)))?;
                Some(Bytes::from(buf))
            }
            None => None,
        };
        self.upload_bytes(data, file_name).await
    }

    pub async fn upload_bytes(
        &self,
        content: Option<Bytes>,
        file_name: &str,
    ) -> Result<ObjectId, FacadeError> {
        let ext = file_ext(file_name);
        let (data, attributes) = match content {
            Some(data) => {
                let attributes = upload_attributes(file_name, data.len());
                (data, attributes)
            }
            None => (Bytes::new(), AttributeSet::new()),
        };
        let size = data.len();
        let id = self
            .session
            .backend()
            .store(data, ext, &attributes)
            .await
            .map_err(|e| FacadeError::from_backend("upload", e))?;
        debug!(file_id = %id, file_name = %file_name, size, "Uploaded");
        Ok(id)
    }

    /// Upload a local file under `file_name`.
    pub async fn upload_path(&self, path: &Path, file_name: &str) -> Result<ObjectId, FacadeError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FacadeError::from_backend("upload", BackendError::Io(e)))?;
        self.upload(Some(file), file_name).await
    }

    pub async fn get_info(&self, id: &ObjectId) -> Result<ObjectInfo, FacadeError> {
        self.session
            .backend()
            .fetch_info(&id.normalized())
            .await
            .map_err(|e| FacadeError::from_backend("get_info", e))
    }

    pub async fn get_metadata(&self, id: &ObjectId) -> Result<AttributeSet, FacadeError> {
        self.session
            .backend()
            .fetch_metadata(&id.normalized())
            .await
            .map_err(|e| FacadeError::from_backend("get_metadata", e))
    }

    pub async fn download(&self, id: &ObjectId) -> Result<Bytes, FacadeError> {
        self.session
            .backend()
            .fetch_content(&id.normalized())
            .await
            .map_err(|e| FacadeError::from_backend("download", e))
    }

    /// Download the whole object and expose it as a reader.
    pub async fn download_reader(&self, id: &ObjectId) -> Result<Cursor<Bytes>, FacadeError> {
        Ok(Cursor::new(self.download(id).await?))
    }

    /// Whether deleting a missing object succeeds is up to the backend.
    pub async fn delete(&self, id: &ObjectId) -> Result<(), FacadeError> {
        self.session
            .backend()
            .remove(&id.normalized())
            .await
            .map_err(|e| FacadeError::from_backend("delete", e))?;
        debug!(file_id = %id, "Deleted");
        Ok(())
    }

    /// Replace `old` with new content: upload first, then delete `old`.
    /// See [`crate::modify`] for the failure cases.
    pub async fn modify(
        &self,
        old: &ObjectId,
        content: Option<Bytes>,
        new_name: &str,
    ) -> Result<ObjectId, ModifyError> {
        modify::run(self, &old.normalized(), content, new_name).await
    }

    pub async fn modify_path(
        &self,
        old: &ObjectId,
        path: &Path,
        new_name: &str,
    ) -> Result<ObjectId, ModifyError> {
        let content = tokio::fs::read(path).await.map_err(|e| ModifyError::UploadFailed {
            old: old.clone(),
            source: FacadeError::from_backend("upload", BackendError::Io(e)),
        })?;
        self.modify(old, Some(Bytes::from(content)), new_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::memory::MemoryBackend;

    fn client() -> FileClient {
        FileClient::new(Session::with_backend(Arc::new(MemoryBackend::new())))
    }

    #[tokio::test]
    async fn test_upload_reader_consumed_to_end() {
        let client = client();
        let reader: &[u8] = b"0123456789";
        let id = client.upload(Some(reader), "digits.txt").await.unwrap();
        assert_eq!(client.download(&id).await.unwrap(), Bytes::from_static(b"0123456789"));
    }

    #[tokio::test]
    async fn test_upload_none_has_no_attributes() {
        let client = client();
        let id = client.upload(None::<&[u8]>, "empty.txt").await.unwrap();
        assert!(client.get_metadata(&id).await.unwrap().is_empty());
        assert!(client.download(&id).await.unwrap().is_empty());
        assert!(id.path.ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_upload_empty_content_keeps_attributes() {
        let client = client();
        let id = client.upload_bytes(Some(Bytes::new()), "empty.txt").await.unwrap();
        let attrs = client.get_metadata(&id).await.unwrap();
        assert_eq!(attrs[1].value, "0");
    }

    #[tokio::test]
    async fn test_upload_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mhw.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let client = client();
        let id = client.upload_path(&path, "mhw.jpg").await.unwrap();
        assert!(id.path.ends_with(".jpg"));
        assert_eq!(client.get_info(&id).await.unwrap().file_size, 17);

        let missing = dir.path().join("absent.jpg");
        let err = client.upload_path(&missing, "absent.jpg").await.unwrap_err();
        assert!(matches!(err, FacadeError::TransferFailed { op: "upload", .. }));
    }

    #[tokio::test]
    async fn test_download_reader() {
        let client = client();
        let id = client.upload_bytes(Some(Bytes::from("streamed")), "s.txt").await.unwrap();
        let mut reader = client.download_reader(&id).await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "streamed");
    }

    #[tokio::test]
    async fn test_missing_object_is_rejected_not_transfer_failure() {
        let client = client();
        let id = ObjectId::new(None, "M00/00/00/missing.jpg");
        assert!(matches!(
            client.get_info(&id).await,
            Err(FacadeError::BackendRejected { code: 2, .. })
        ));
        assert!(matches!(
            client.download(&id).await,
            Err(FacadeError::BackendRejected { code: 2, .. })
        ));
    }
}
