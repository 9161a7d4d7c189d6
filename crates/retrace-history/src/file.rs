use crate::memory::InMemoryHistoryStore;
use crate::store::HistoryStore;
use async_trait::async_trait;
use retrace_core::{Message, RetraceError, RetraceResult, Session};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// File-backed history store.
///
/// Layout: one `<session>.meta.json` (the session record, rewritten on every
/// append) and one `<session>.messages.jsonl` (append-only message lines)
/// per session under `dir`. All reads are served by an in-memory store
/// loaded once at construction; writes commit to memory first, then to
/// disk.
pub struct FileHistoryStore {
    dir: PathBuf,
    inner: InMemoryHistoryStore,
}

impl FileHistoryStore {
    /// Opens a store rooted at `dir`, creating the directory if needed and
    /// loading every session found in it.
    ///
    /// Message lines are imported without link validation: a chain broken
    /// on disk (history pruned out from under a checkpoint) must stay
    /// readable, reported by the walk itself rather than at load time.
    pub async fn new(dir: PathBuf) -> RetraceResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let inner = InMemoryHistoryStore::new();

        let mut meta_ids: Vec<Uuid> = Vec::new();
        let mut message_ids: Vec<Uuid> = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".meta.json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        meta_ids.push(id);
                    }
                } else if let Some(stem) = name.strip_suffix(".messages.jsonl") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        message_ids.push(id);
                    }
                }
            }
        }
        meta_ids.sort();
        message_ids.sort();

        let store = Self { dir, inner };
        for id in meta_ids {
            let path = store.meta_path(id);
            let data = tokio::fs::read_to_string(&path).await?;
            let session: Session = serde_json::from_str(&data).map_err(|e| {
                RetraceError::Storage(format!("invalid session file {}: {e}", path.display()))
            })?;
            store.inner.insert_session(session).await?;
        }
        for id in message_ids {
            let path = store.messages_path(id);
            let data = tokio::fs::read_to_string(&path).await?;
            for line in data.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let message: Message = serde_json::from_str(line).map_err(|e| {
                    RetraceError::Storage(format!(
                        "invalid message line in {}: {e}",
                        path.display()
                    ))
                })?;
                store.inner.insert_message_unchecked(message).await?;
            }
        }

        Ok(store)
    }

    fn meta_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.meta.json"))
    }

    fn messages_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.messages.jsonl"))
    }

    /// Creates a session up front and persists its record.
    pub async fn create_session(&self, title: Option<&str>) -> RetraceResult<Session> {
        let session = self.inner.create_session(title).await?;
        self.write_meta(&session).await?;
        Ok(session)
    }

    /// Appends a message through the validated write path, then persists
    /// the message line and the refreshed session record.
    pub async fn append_message(&self, message: Message) -> RetraceResult<Message> {
        let message = self.inner.append_message(message).await?;
        self.append_line(&message).await?;
        if let Some(session) = self.inner.session(message.session_id).await {
            self.write_meta(&session).await?;
        }
        Ok(message)
    }

    async fn write_meta(&self, session: &Session) -> RetraceResult<()> {
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(self.meta_path(session.id), json).await?;
        Ok(())
    }

    async fn append_line(&self, message: &Message) -> RetraceResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.messages_path(message.session_id))
            .await?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn list_sessions(&self) -> RetraceResult<Vec<Session>> {
        self.inner.list_sessions().await
    }

    async fn thread_tree(&self, session_id: Uuid) -> RetraceResult<Vec<Message>> {
        self.inner.thread_tree(session_id).await
    }

    async fn recent_messages(&self, session_id: Uuid, limit: usize) -> RetraceResult<Vec<Message>> {
        self.inner.recent_messages(session_id, limit).await
    }

    async fn search_messages(
        &self,
        keyword: &str,
        session_id: Option<Uuid>,
    ) -> RetraceResult<Vec<Message>> {
        self.inner.search_messages(keyword, session_id).await
    }

    async fn history_for_message(&self, message_id: Uuid) -> RetraceResult<Vec<Message>> {
        self.inner.history_for_message(message_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_store() -> (FileHistoryStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = FileHistoryStore::new(tmp.path().join("history"))
            .await
            .unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn append_and_reload_across_instances() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("history");
        let session_id;
        let tail_id;

        {
            let store = FileHistoryStore::new(dir.clone()).await.unwrap();
            let root = store
                .append_message(Message::new(Uuid::new_v4(), "first"))
                .await
                .unwrap();
            let tail = store
                .append_message(Message::reply_to(&root, "second"))
                .await
                .unwrap();
            session_id = root.session_id;
            tail_id = tail.id;
        }

        let reloaded = FileHistoryStore::new(dir).await.unwrap();
        let history = reloaded.history_for_message(tail_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].id, tail_id);

        let sessions = reloaded.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session_id);
        assert_eq!(sessions[0].preview_text.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn session_title_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("history");

        let session = {
            let store = FileHistoryStore::new(dir.clone()).await.unwrap();
            let session = store.create_session(Some("Trip planning")).await.unwrap();
            store
                .append_message(Message::new(session.id, "where to?"))
                .await
                .unwrap();
            session
        };

        let reloaded = FileHistoryStore::new(dir).await.unwrap();
        let sessions = reloaded.list_sessions().await.unwrap();
        assert_eq!(sessions[0].id, session.id);
        assert_eq!(sessions[0].title.as_deref(), Some("Trip planning"));
    }

    #[tokio::test]
    async fn broken_chain_on_disk_stays_readable() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("history");
        tokio::fs::create_dir_all(&dir).await.unwrap();

        // Fabricate a message whose predecessor was pruned from the file.
        let session = Uuid::new_v4();
        let mut stranded = Message::new(session, "survivor");
        stranded.previous_id = Some(Uuid::new_v4());
        let line = serde_json::to_string(&stranded).unwrap();
        tokio::fs::write(
            dir.join(format!("{session}.messages.jsonl")),
            format!("{line}\n"),
        )
        .await
        .unwrap();

        let store = FileHistoryStore::new(dir).await.unwrap();
        let err = store.history_for_message(stranded.id).await.unwrap_err();
        match err {
            RetraceError::BrokenChain { partial, missing, .. } => {
                assert_eq!(missing, stranded.previous_id.unwrap());
                assert_eq!(partial.len(), 1);
                assert_eq!(partial[0].id, stranded.id);
            }
            other => panic!("expected BrokenChain, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrelated_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("history");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("notes.txt"), "not a session")
            .await
            .unwrap();
        tokio::fs::write(dir.join("bad-uuid.meta.json"), "{}")
            .await
            .unwrap();

        let store = FileHistoryStore::new(dir).await.unwrap();
        assert!(store.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_errors_do_not_touch_disk() {
        let (store, _tmp) = temp_store().await;
        let session = Uuid::new_v4();
        let mut orphan = Message::new(session, "hello");
        orphan.previous_id = Some(Uuid::new_v4());

        assert!(store.append_message(orphan).await.is_err());
        assert!(!store.messages_path(session).exists());
        assert!(!store.meta_path(session).exists());
    }
}
