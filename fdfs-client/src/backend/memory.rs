//! In-memory storage backend.
//!
//! Useful for development and tests: nothing is persisted, and store or
//! remove failures can be switched on to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use fdfs_common::backend::ENOENT;
use fdfs_common::object::{Attribute, AttributeSet, ObjectId, ObjectInfo, DEFAULT_GROUP};
use fdfs_common::{BackendError, StorageBackend};

/// errno returned for injected remove failures.
const EIO: u8 = 5;

struct StoredObject {
    data: Bytes,
    attributes: AttributeSet,
    created: DateTime<Utc>,
    crc32: u32,
}

pub struct MemoryBackend {
    group: String,
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    fail_store: AtomicBool,
    fail_remove: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_group(DEFAULT_GROUP)
    }

    pub fn with_group(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            objects: RwLock::new(HashMap::new()),
            fail_store: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }

    /// Make every store fail as if the storage node were unreachable.
    pub fn fail_stores(&self, on: bool) {
        self.fail_store.store(on, Ordering::SeqCst);
    }

    /// Make every remove fail with an I/O errno from the storage node.
    pub fn fail_removes(&self, on: bool) {
        self.fail_remove.store(on, Ordering::SeqCst);
    }

    pub async fn contains(&self, id: &ObjectId) -> bool {
        self.objects.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn new_path(ext: &str) -> String {
        let name = Uuid::new_v4().simple().to_string();
        let mut path = format!("M00/{}/{}/{}", &name[..2], &name[2..4], name);
        if !ext.is_empty() {
            path.push('.');
            path.push_str(ext);
        }
        path
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found() -> BackendError {
    BackendError::Status { code: ENOENT }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store(
        &self,
        data: Bytes,
        ext: &str,
        attributes: &[Attribute],
    ) -> Result<ObjectId, BackendError> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("memory backend: store disabled".to_string()));
        }
        let id = ObjectId {
            group: self.group.clone(),
            path: Self::new_path(ext),
        };
        let object = StoredObject {
            crc32: crc32fast::hash(&data),
            data,
            attributes: attributes.to_vec(),
            created: Utc::now(),
        };
        self.objects.write().await.insert(id.clone(), object);
        Ok(id)
    }

    async fn fetch_info(&self, id: &ObjectId) -> Result<ObjectInfo, BackendError> {
        let objects = self.objects.read().await;
        let object = objects.get(id).ok_or_else(not_found)?;
        Ok(ObjectInfo {
            file_size: object.data.len() as u64,
            create_time: object.created,
            crc32: object.crc32,
            source_ip: "127.0.0.1".to_string(),
        })
    }

    async fn fetch_metadata(&self, id: &ObjectId) -> Result<AttributeSet, BackendError> {
        let objects = self.objects.read().await;
        let object = objects.get(id).ok_or_else(not_found)?;
        Ok(object.attributes.clone())
    }

    async fn fetch_content(&self, id: &ObjectId) -> Result<Bytes, BackendError> {
        let objects = self.objects.read().await;
        let object = objects.get(id).ok_or_else(not_found)?;
        Ok(object.data.clone())
    }

    async fn remove(&self, id: &ObjectId) -> Result<(), BackendError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(BackendError::Status { code: EIO });
        }
        match self.objects.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(not_found()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let attrs = vec![Attribute::new("file_name", "hello.txt")];

        let id = backend.store(Bytes::from("hello world"), "txt", &attrs).await.unwrap();
        assert_eq!(id.group, "group1");
        assert!(id.path.starts_with("M00/"));
        assert!(id.path.ends_with(".txt"));

        assert_eq!(backend.fetch_content(&id).await.unwrap(), Bytes::from("hello world"));
        assert_eq!(backend.fetch_metadata(&id).await.unwrap(), attrs);

        let info = backend.fetch_info(&id).await.unwrap();
        assert_eq!(info.file_size, 11);
        assert_eq!(info.crc32, crc32fast::hash(b"hello world"));

        backend.remove(&id).await.unwrap();
        assert!(backend.is_empty().await);
        assert!(backend.remove(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_extensionless_path() {
        let backend = MemoryBackend::with_group("group2");
        let id = backend.store(Bytes::new(), "", &[]).await.unwrap();
        assert_eq!(id.group, "group2");
        assert!(!id.path.contains('.'));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MemoryBackend::new();
        let id = backend.store(Bytes::from("x"), "bin", &[]).await.unwrap();

        backend.fail_removes(true);
        assert_eq!(backend.remove(&id).await.unwrap_err().status(), Some(EIO));
        assert!(backend.contains(&id).await);

        backend.fail_stores(true);
        assert!(matches!(
            backend.store(Bytes::from("y"), "bin", &[]).await,
            Err(BackendError::Unavailable(_))
        ));
        assert_eq!(backend.len().await, 1);
    }
}
