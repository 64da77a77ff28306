//! Vocabulary shared by the FastDFS facade crates: how stored objects are
//! addressed and described, and the trait every storage backend implements.

pub mod backend;
pub mod object;

pub use backend::{BackendError, StorageBackend};
pub use object::{Attribute, AttributeSet, ObjectId, ObjectInfo};
