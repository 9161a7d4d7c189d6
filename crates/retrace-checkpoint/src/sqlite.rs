use crate::store::{sort_newest_first, CheckpointStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retrace_core::{Checkpoint, Message, RetraceError, RetraceResult};
use rusqlite::{params, Connection};
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    id         TEXT PRIMARY KEY,
    label      TEXT NOT NULL,
    message_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    message    TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS checkpoints_session_idx ON checkpoints (session_id);
";

fn sql_err(e: rusqlite::Error) -> RetraceError {
    RetraceError::Storage(e.to_string())
}

fn closed() -> RetraceError {
    RetraceError::Storage("store is closed".to_string())
}

fn parse_uuid(text: &str) -> RetraceResult<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| RetraceError::Storage(format!("invalid uuid in database: {e}")))
}

fn parse_ts(text: &str) -> RetraceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RetraceError::Storage(format!("invalid timestamp in database: {e}")))
}

struct CheckpointRow {
    id: String,
    label: String,
    message_id: String,
    session_id: String,
    message: Option<String>,
    created_at: String,
}

impl CheckpointRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            message_id: row.get(2)?,
            session_id: row.get(3)?,
            message: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_checkpoint(self) -> RetraceResult<Checkpoint> {
        Ok(Checkpoint {
            id: parse_uuid(&self.id)?,
            label: self.label,
            message_id: parse_uuid(&self.message_id)?,
            session_id: parse_uuid(&self.session_id)?,
            message: self
                .message
                .as_deref()
                .map(serde_json::from_str::<Message>)
                .transpose()?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

const CHECKPOINT_COLUMNS: &str = "id, label, message_id, session_id, message, created_at";

/// SQLite-backed checkpoint store.
///
/// One connection guarded by a mutex, the same arrangement as the history
/// backend. Rows load in `rowid` order so equal timestamps keep their
/// insertion order when sorted.
pub struct SqliteCheckpointStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteCheckpointStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists.
    pub async fn new(path: impl AsRef<Path>) -> RetraceResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path.as_ref()).map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Closes the underlying connection. Later calls are no-ops; later
    /// store operations fail with [`RetraceError::Storage`].
    pub async fn close(&self) -> RetraceResult<()> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| RetraceError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
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

        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        conn.execute(
            "INSERT INTO checkpoints (id, label, message_id, session_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                checkpoint.id.to_string(),
                checkpoint.label,
                checkpoint.message_id.to_string(),
                checkpoint.session_id.to_string(),
                checkpoint
                    .message
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                checkpoint.created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        Ok(checkpoint)
    }

    async fn list_checkpoints(&self, session_id: Option<Uuid>) -> RetraceResult<Vec<Checkpoint>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        let mut checkpoints = match session_id {
            Some(sid) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
                         WHERE session_id = ?1 ORDER BY rowid"
                    ))
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map(params![sid.to_string()], CheckpointRow::read)
                    .map_err(sql_err)?;
                let mut list = Vec::new();
                for row in rows {
                    list.push(row.map_err(sql_err)?.into_checkpoint()?);
                }
                list
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints ORDER BY rowid"
                    ))
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], CheckpointRow::read).map_err(sql_err)?;
                let mut list = Vec::new();
                for row in rows {
                    list.push(row.map_err(sql_err)?.into_checkpoint()?);
                }
                list
            }
        };
        sort_newest_first(&mut checkpoints);
        Ok(checkpoints)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::target::CheckpointRef;
    use tempfile::TempDir;

    async fn temp_store() -> (SqliteCheckpointStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteCheckpointStore::new(tmp.path().join("checkpoints.db"))
            .await
            .unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_sql() {
        let (store, _tmp) = temp_store().await;
        let message = Message::new(Uuid::new_v4(), serde_json::json!({"command": "plan"}))
            .with_response("three steps");

        let created = store.create_checkpoint("plan", &message).await.unwrap();
        let found = store
            .retrieve_checkpoint(CheckpointRef::Id(created.id), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.label, "plan");
        assert_eq!(found.message_id, message.id);
        let snapshot = found.message.unwrap();
        assert_eq!(snapshot.request, message.request);
        assert_eq!(snapshot.response, message.response);
    }

    #[tokio::test]
    async fn reload_across_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoints.db");
        let message = Message::new(Uuid::new_v4(), "persisted");

        let created = {
            let store = SqliteCheckpointStore::new(&path).await.unwrap();
            let created = store.create_checkpoint("keep", &message).await.unwrap();
            store.close().await.unwrap();
            created
        };

        let store = SqliteCheckpointStore::new(&path).await.unwrap();
        let found = store
            .retrieve_checkpoint(CheckpointRef::Id(created.id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.label, "keep");
        assert_eq!(found.message_id, message.id);
    }

    #[tokio::test]
    async fn list_is_newest_first_with_insertion_tie_break() {
        let (store, _tmp) = temp_store().await;
        let message = Message::new(Uuid::new_v4(), "hello");

        let c1 = store.create_checkpoint("first", &message).await.unwrap();
        let c2 = store.create_checkpoint("second", &message).await.unwrap();
        let c3 = store.create_checkpoint("third", &message).await.unwrap();

        let list = store.list_checkpoints(None).await.unwrap();
        let ids: Vec<Uuid> = list.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c3.id, c2.id, c1.id]);
    }

    #[tokio::test]
    async fn index_and_scope_behave_like_memory_backend() {
        let (store, _tmp) = temp_store().await;
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();
        let in_a = store
            .create_checkpoint("a", &Message::new(session_a, "a"))
            .await
            .unwrap();
        let in_b = store
            .create_checkpoint("b", &Message::new(session_b, "b"))
            .await
            .unwrap();

        let newest_in_a = store
            .retrieve_checkpoint(CheckpointRef::Index(0), Some(session_a))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest_in_a.id, in_a.id);

        let cross = store
            .retrieve_checkpoint(CheckpointRef::Id(in_b.id), Some(session_a))
            .await
            .unwrap();
        assert!(cross.is_none());

        let out_of_range = store
            .retrieve_checkpoint(CheckpointRef::Index(5), None)
            .await
            .unwrap();
        assert!(out_of_range.is_none());
    }

    #[tokio::test]
    async fn nil_message_id_is_rejected() {
        let (store, _tmp) = temp_store().await;
        let mut message = Message::new(Uuid::new_v4(), "hello");
        message.id = Uuid::nil();

        let err = store.create_checkpoint("x", &message).await.unwrap_err();
        assert!(matches!(err, RetraceError::InvalidArgument(_)));
        assert!(store.list_checkpoints(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_service() {
        let (store, _tmp) = temp_store().await;
        store.close().await.unwrap();
        store.close().await.unwrap();

        let err = store.list_checkpoints(None).await.unwrap_err();
        assert!(matches!(err, RetraceError::Storage(_)));
    }
}
