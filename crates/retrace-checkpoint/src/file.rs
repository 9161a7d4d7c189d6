use crate::memory::InMemoryCheckpointStore;
use crate::store::CheckpointStore;
use async_trait::async_trait;
use retrace_core::{Checkpoint, Message, RetraceError, RetraceResult};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// File-backed checkpoint store that persists records as JSONL on disk.
///
/// Loads all checkpoints into memory on creation and appends one line per
/// new checkpoint. Reads are served from memory; writes commit to memory
/// first, then to disk.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    inner: InMemoryCheckpointStore,
}

impl FileCheckpointStore {
    /// Opens a store backed by the JSONL file at `path`, creating parent
    /// directories if needed and loading every checkpoint found in it.
    pub async fn new(path: PathBuf) -> RetraceResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let inner = InMemoryCheckpointStore::new();

        if path.exists() {
            let data = tokio::fs::read_to_string(&path).await?;
            for line in data.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let checkpoint: Checkpoint = serde_json::from_str(line).map_err(|e| {
                    RetraceError::Storage(format!(
                        "invalid checkpoint line in {}: {e}",
                        path.display()
                    ))
                })?;
                inner.insert(checkpoint).await?;
            }
        }

        Ok(Self { path, inner })
    }

    async fn append_line(&self, checkpoint: &Checkpoint) -> RetraceResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut line = serde_json::to_string(checkpoint)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn create_checkpoint(
        &self,
        label: &str,
        current: &Message,
    ) -> RetraceResult<Checkpoint> {
        let checkpoint = self.inner.create_checkpoint(label, current).await?;
        self.append_line(&checkpoint).await?;
        Ok(checkpoint)
    }

    async fn list_checkpoints(&self, session_id: Option<Uuid>) -> RetraceResult<Vec<Checkpoint>> {
        self.inner.list_checkpoints(session_id).await
    }
}
