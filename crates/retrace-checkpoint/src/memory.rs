use crate::store::{sort_newest_first, CheckpointStore};
use async_trait::async_trait;
use retrace_core::{Checkpoint, Message, RetraceError, RetraceResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory checkpoint store.
#[derive(Debug)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<Vec<Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            checkpoints: RwLock::new(Vec::new()),
        }
    }

    /// Imports an existing checkpoint record, as persisted backends do when
    /// loading.
    pub async fn insert(&self, checkpoint: Checkpoint) -> RetraceResult<()> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.push(checkpoint);
        Ok(())
    }

    /// Number of checkpoints held.
    pub async fn count(&self) -> usize {
        self.checkpoints.read().await.len()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create_checkpoint(
        &self,
        label: &str,
        current: &Message,
    ) -> RetraceResult<Checkpoint> {
        if current.id.is_nil() {
            return Err(RetraceError::InvalidArgument(
                "cannot checkpoint a message without an id".to_string(),
            ));
        }
        let checkpoint = Checkpoint::capture(label, current);
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn list_checkpoints(&self, session_id: Option<Uuid>) -> RetraceResult<Vec<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        let mut list: Vec<Checkpoint> = checkpoints
            .iter()
            .filter(|c| {
                if let Some(sid) = session_id {
                    c.session_id == sid
                } else {
                    true
                }
            })
            .cloned()
            .collect();
        sort_newest_first(&mut list);
        Ok(list)
    }
}
