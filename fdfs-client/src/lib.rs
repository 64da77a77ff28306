//! Client facade over a FastDFS cluster.
//!
//! A [`Session`] discovers a storage node through the trackers and binds to
//! it. A [`FileClient`] on top of it uploads, reads, deletes and replaces
//! objects addressed by `(group, path)`. [`compat::SentinelClient`] keeps the
//! older nil/-1 calling convention for callers that need it.

pub mod backend;
pub mod compat;
pub mod config;
pub mod connection;
pub mod error;
pub mod facade;
pub mod modify;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod tracker;

pub use config::{BackendKind, ClientConfig};
pub use error::{FacadeError, InitError};
pub use facade::FileClient;
pub use modify::{ModifyError, ModifyStage, ModifyState, OrphanPolicy};
pub use session::Session;

pub use fdfs_common::{Attribute, AttributeSet, BackendError, ObjectId, ObjectInfo, StorageBackend};
