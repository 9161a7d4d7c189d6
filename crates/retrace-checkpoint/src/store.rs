use crate::target::CheckpointRef;
use async_trait::async_trait;
use retrace_core::{Checkpoint, Message, RetraceResult};
use uuid::Uuid;

/// Contract for checkpoint backends.
///
/// Checkpoints are append-only named aliases into the message graph; no
/// operation here mutates or deletes messages. "Not found" is a normal
/// outcome for retrieval, returned as `None` rather than an error.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists a checkpoint referencing `current`.
    ///
    /// A blank `label` gets [`DEFAULT_CHECKPOINT_LABEL`]; the session scope
    /// is taken from `current.session_id`. Fails with
    /// [`RetraceError::InvalidArgument`] when `current` carries a nil id.
    ///
    /// [`DEFAULT_CHECKPOINT_LABEL`]: retrace_core::DEFAULT_CHECKPOINT_LABEL
    /// [`RetraceError::InvalidArgument`]: retrace_core::RetraceError::InvalidArgument
    async fn create_checkpoint(
        &self,
        label: &str,
        current: &Message,
    ) -> RetraceResult<Checkpoint>;

    /// Checkpoints newest-first by `created_at` (ties: latest-created
    /// first), optionally scoped to one session.
    async fn list_checkpoints(&self, session_id: Option<Uuid>) -> RetraceResult<Vec<Checkpoint>>;

    /// Resolves a target against the (optionally session-scoped)
    /// newest-first list: index 0 is the newest checkpoint, an id matches
    /// exactly. The scope applies to id lookups too. No match is `None`,
    /// never an error.
    async fn retrieve_checkpoint(
        &self,
        target: CheckpointRef,
        session_id: Option<Uuid>,
    ) -> RetraceResult<Option<Checkpoint>> {
        let list = self.list_checkpoints(session_id).await?;
        Ok(match target {
            CheckpointRef::Id(id) => list.into_iter().find(|c| c.id == id),
            CheckpointRef::Index(index) => list.into_iter().nth(index),
        })
    }
}

/// Newest-first ordering shared by the backends: descending `created_at`,
/// ties broken latest-created first.
pub(crate) fn sort_newest_first(checkpoints: &mut [Checkpoint]) {
    checkpoints.reverse();
    checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
