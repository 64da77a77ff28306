//! Replace an object by uploading the new content and then deleting the old
//! object.
//!
//! The storage tier has no replace primitive, so modify is two independent
//! requests and is not atomic. Upload always runs first: if it fails, the old
//! object is still there. If the delete then fails, the new object already
//! exists and nothing references it. [`OrphanPolicy`] decides whether it is
//! left in place or removed again.

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info, warn};

use fdfs_common::ObjectId;

use crate::error::FacadeError;
use crate::facade::FileClient;

/// What to do with the replacement when deleting the original fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave the replacement in place and report it as orphaned.
    #[default]
    Keep,
    /// Delete the replacement so the call leaves the store as it found it.
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyStage {
    Upload,
    Delete,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyState {
    NotStarted,
    NewUploaded(ObjectId),
    OldDeleted(ObjectId),
    Failed(ModifyStage),
}

#[derive(Debug, thiserror::Error)]
pub enum ModifyError {
    #[error("replacement upload failed, {old} left untouched: {source}")]
    UploadFailed {
        old: ObjectId,
        #[source]
        source: FacadeError,
    },
    #[error("uploaded {new} but could not delete {old}, {new} is orphaned: {source}")]
    Orphaned {
        old: ObjectId,
        new: ObjectId,
        #[source]
        source: FacadeError,
    },
    #[error("could not delete {old}, replacement was rolled back: {source}")]
    RolledBack {
        old: ObjectId,
        #[source]
        source: FacadeError,
    },
    #[error("could not delete {old} and rollback of {new} failed ({rollback}): {source}")]
    RollbackFailed {
        old: ObjectId,
        new: ObjectId,
        #[source]
        source: FacadeError,
        rollback: FacadeError,
    },
}

impl ModifyError {
    /// The step that ended the modify.
    pub fn stage(&self) -> ModifyStage {
        match self {
            ModifyError::UploadFailed { .. } => ModifyStage::Upload,
            ModifyError::Orphaned { .. } | ModifyError::RolledBack { .. } => ModifyStage::Delete,
            ModifyError::RollbackFailed { .. } => ModifyStage::Rollback,
        }
    }

    pub fn state(&self) -> ModifyState {
        ModifyState::Failed(self.stage())
    }

    /// The replacement object left behind, if any.
    pub fn orphan(&self) -> Option<&ObjectId> {
        match self {
            ModifyError::Orphaned { new, .. } | ModifyError::RollbackFailed { new, .. } => Some(new),
            ModifyError::UploadFailed { .. } | ModifyError::RolledBack { .. } => None,
        }
    }
}

struct Modification<'a> {
    client: &'a FileClient,
    old: &'a ObjectId,
    content: Option<Option<Bytes>>,
    new_name: &'a str,
}

impl Modification<'_> {
    async fn upload_replacement(&mut self) -> Result<ObjectId, ModifyError> {
        let content = self.content.take().flatten();
        self.client
            .upload_bytes(content, self.new_name)
            .await
            .map_err(|source| ModifyError::UploadFailed {
                old: self.old.clone(),
                source,
            })
    }

    async fn delete_original(&self, new: &ObjectId) -> Result<(), ModifyError> {
        match self.client.delete(self.old).await {
            Ok(()) => Ok(()),
            Err(source) => Err(self.settle_orphan(new.clone(), source).await),
        }
    }

    async fn settle_orphan(&self, new: ObjectId, source: FacadeError) -> ModifyError {
        let old = self.old.clone();
        match self.client.orphan_policy() {
            OrphanPolicy::Keep => {
                warn!(old = %old, new = %new, error = %source, "Original not deleted, replacement orphaned");
                ModifyError::Orphaned { old, new, source }
            }
            OrphanPolicy::Rollback => match self.client.delete(&new).await {
                Ok(()) => {
                    info!(old = %old, new = %new, error = %source, "Original not deleted, replacement rolled back");
                    ModifyError::RolledBack { old, source }
                }
                Err(rollback) => {
                    warn!(old = %old, new = %new, error = %rollback, "Rollback of replacement failed");
                    ModifyError::RollbackFailed {
                        old,
                        new,
                        source,
                        rollback,
                    }
                }
            },
        }
    }
}

/// Drive `NotStarted -> NewUploaded -> OldDeleted`. A failing step returns
/// its error, which reports the matching `Failed` state.
pub(crate) async fn run(
    client: &FileClient,
    old: &ObjectId,
    content: Option<Bytes>,
    new_name: &str,
) -> Result<ObjectId, ModifyError> {
    let mut op = Modification {
        client,
        old,
        content: Some(content),
        new_name,
    };
    debug!(old = %old, state = ?ModifyState::NotStarted, "Modify step");

    let new = op.upload_replacement().await?;
    debug!(old = %old, state = ?ModifyState::NewUploaded(new.clone()), "Modify step");

    op.delete_original(&new).await?;
    debug!(old = %old, state = ?ModifyState::OldDeleted(new.clone()), "Modify step");
    Ok(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::memory::MemoryBackend;
    use crate::session::Session;

    fn client(backend: Arc<MemoryBackend>, policy: OrphanPolicy) -> FileClient {
        FileClient::new(Session::with_backend(backend)).with_orphan_policy(policy)
    }

    #[tokio::test]
    async fn test_each_failure_reports_its_stage() {
        let backend = Arc::new(MemoryBackend::new());
        let keep = client(backend.clone(), OrphanPolicy::Keep);
        let old = keep.upload_bytes(Some(Bytes::from("a")), "a.txt").await.unwrap();

        backend.fail_stores(true);
        let err = run(&keep, &old, Some(Bytes::from("b")), "b.txt").await.unwrap_err();
        assert_eq!(err.state(), ModifyState::Failed(ModifyStage::Upload));
        backend.fail_stores(false);

        backend.fail_removes(true);
        let err = run(&keep, &old, Some(Bytes::from("b")), "b.txt").await.unwrap_err();
        assert_eq!(err.state(), ModifyState::Failed(ModifyStage::Delete));

        let rollback = client(backend.clone(), OrphanPolicy::Rollback);
        let err = run(&rollback, &old, Some(Bytes::from("c")), "c.txt").await.unwrap_err();
        assert_eq!(err.state(), ModifyState::Failed(ModifyStage::Rollback));
        backend.fail_removes(false);

        let new = run(&keep, &old, Some(Bytes::from("d")), "d.txt").await.unwrap();
        assert!(backend.contains(&new).await);
        assert!(!backend.contains(&old).await);
    }

    #[test]
    fn test_orphan_policy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            on_orphan: OrphanPolicy,
        }
        let parsed: Wrapper = toml::from_str("on_orphan = \"rollback\"").unwrap();
        assert_eq!(parsed.on_orphan, OrphanPolicy::Rollback);
    }
}
