use bytes::Bytes;

use crate::object::{Attribute, AttributeSet, ObjectId, ObjectInfo};

/// errno reported by a storage node for a file it does not hold.
pub const ENOENT: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{op} timed out")]
    Timeout { op: &'static str },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("storage rejected request with status {code}")]
    Status { code: u8 },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl BackendError {
    /// The errno the backend answered with, if it answered at all.
    pub fn status(&self) -> Option<u8> {
        match self {
            BackendError::Status { code } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(ENOENT)
    }
}

/// Trait implemented by every storage backend the facade can sit on.
///
/// A backend owns the transport to one storage node. It stores bytes under a
/// path it chooses, and reads or removes objects by identifier. Group
/// defaulting, attribute derivation and the modify sequence live above this
/// trait, in the facade.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` and attach `attributes`, returning the freshly minted
    /// identifier. `ext` is the extension hint without a leading dot.
    async fn store(
        &self,
        data: Bytes,
        ext: &str,
        attributes: &[Attribute],
    ) -> Result<ObjectId, BackendError>;

    /// Size, creation time, checksum and source node of an object.
    async fn fetch_info(&self, id: &ObjectId) -> Result<ObjectInfo, BackendError>;

    /// Attributes stored alongside the object, in backend order.
    async fn fetch_metadata(&self, id: &ObjectId) -> Result<AttributeSet, BackendError>;

    /// Full object content.
    async fn fetch_content(&self, id: &ObjectId) -> Result<Bytes, BackendError>;

    /// Remove an object. A non-zero storage status comes back as
    /// [`BackendError::Status`].
    async fn remove(&self, id: &ObjectId) -> Result<(), BackendError>;
}
