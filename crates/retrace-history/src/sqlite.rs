use crate::store::HistoryStore;
use crate::thread::ThreadIndex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retrace_core::session::PREVIEW_MAX_CHARS;
use retrace_core::{Message, Payload, RetraceError, RetraceResult, Session};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    title         TEXT,
    created_at    TEXT NOT NULL,
    last_activity TEXT,
    preview_text  TEXT
);
CREATE TABLE IF NOT EXISTS messages (
    id                      TEXT PRIMARY KEY,
    session_id              TEXT NOT NULL,
    previous_id             TEXT,
    request                 TEXT NOT NULL,
    response                TEXT,
    prior_state             TEXT,
    cumulative_input_length INTEGER,
    created_at              TEXT NOT NULL,
    updated_at              TEXT
);
CREATE INDEX IF NOT EXISTS messages_session_idx ON messages (session_id);
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

struct SessionRow {
    id: String,
    title: Option<String>,
    created_at: String,
    last_activity: Option<String>,
    preview_text: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> RetraceResult<Session> {
        Ok(Session {
            id: parse_uuid(&self.id)?,
            title: self.title,
            created_at: parse_ts(&self.created_at)?,
            last_activity: self.last_activity.as_deref().map(parse_ts).transpose()?,
            preview_text: self.preview_text,
        })
    }
}

struct MessageRow {
    id: String,
    session_id: String,
    previous_id: Option<String>,
    request: String,
    response: Option<String>,
    prior_state: Option<String>,
    cumulative_input_length: Option<i64>,
    created_at: String,
    updated_at: Option<String>,
}

impl MessageRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            previous_id: row.get(2)?,
            request: row.get(3)?,
            response: row.get(4)?,
            prior_state: row.get(5)?,
            cumulative_input_length: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_message(self) -> RetraceResult<Message> {
        Ok(Message {
            id: parse_uuid(&self.id)?,
            session_id: parse_uuid(&self.session_id)?,
            previous_id: self.previous_id.as_deref().map(parse_uuid).transpose()?,
            request: serde_json::from_str(&self.request)?,
            response: self
                .response
                .as_deref()
                .map(serde_json::from_str::<Payload>)
                .transpose()?,
            prior_state: self
                .prior_state
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
            cumulative_input_length: self.cumulative_input_length.map(|n| n as u64),
            created_at: parse_ts(&self.created_at)?,
            updated_at: self.updated_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, session_id, previous_id, request, response, prior_state, \
                               cumulative_input_length, created_at, updated_at";

/// SQLite-backed history store.
///
/// One connection guarded by a mutex; statements run on the calling task
/// and are short. `rowid` provides insertion order, timestamps are stored
/// as RFC 3339 text. The walk and windowing logic is the shared
/// [`ThreadIndex`], the same code the other backends use.
pub struct SqliteHistoryStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteHistoryStore {
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

    /// Creates a session up front.
    pub async fn create_session(&self, title: Option<&str>) -> RetraceResult<Session> {
        let session = match title {
            Some(title) => Session::with_title(title),
            None => Session::new(),
        };
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        conn.execute(
            "INSERT INTO sessions (id, title, created_at, last_activity, preview_text)
             VALUES (?1, ?2, ?3, NULL, NULL)",
            params![
                session.id.to_string(),
                session.title,
                session.created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        Ok(session)
    }

    /// Appends a message through the validated write path; same rules as
    /// the in-memory store, committed in one transaction.
    pub async fn append_message(&self, message: Message) -> RetraceResult<Message> {
        let mut message = message;
        if message.id.is_nil() {
            return Err(RetraceError::InvalidArgument(
                "message id must not be nil".to_string(),
            ));
        }

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let tx = conn.transaction().map_err(sql_err)?;

        let duplicate: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM messages WHERE id = ?1",
                params![message.id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        if duplicate.is_some() {
            return Err(RetraceError::InvalidArgument(format!(
                "message {} already exists",
                message.id
            )));
        }

        let mut parent_total: u64 = 0;
        if let Some(previous_id) = message.previous_id {
            let parent: Option<(String, String, Option<i64>)> = tx
                .query_row(
                    "SELECT session_id, created_at, cumulative_input_length
                     FROM messages WHERE id = ?1",
                    params![previous_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(sql_err)?;
            let Some((parent_session, parent_created, parent_cumulative)) = parent else {
                return Err(RetraceError::InvalidArgument(format!(
                    "previous message {previous_id} does not exist"
                )));
            };
            if parse_uuid(&parent_session)? != message.session_id {
                return Err(RetraceError::InvalidArgument(format!(
                    "previous message {previous_id} belongs to another session"
                )));
            }
            if parse_ts(&parent_created)? > message.created_at {
                return Err(RetraceError::InvalidArgument(format!(
                    "previous message {previous_id} was created after this one"
                )));
            }
            parent_total = parent_cumulative.unwrap_or(0) as u64;
        }

        if message.cumulative_input_length.is_none() {
            message.cumulative_input_length = Some(parent_total + message.request.input_len());
        }

        let preview: String = message
            .request
            .search_text()
            .chars()
            .take(PREVIEW_MAX_CHARS)
            .collect();
        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, title, created_at, last_activity, preview_text)
             VALUES (?1, NULL, ?2, NULL, NULL)",
            params![
                message.session_id.to_string(),
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        tx.execute(
            "UPDATE sessions SET last_activity = ?2, preview_text = ?3 WHERE id = ?1",
            params![
                message.session_id.to_string(),
                message.created_at.to_rfc3339(),
                preview,
            ],
        )
        .map_err(sql_err)?;

        insert_message_row(&tx, &message)?;
        tx.commit().map_err(sql_err)?;
        Ok(message)
    }

    /// Inserts a message without link validation or session bookkeeping,
    /// for bulk imports of graphs that may contain dangling links.
    pub async fn insert_message_unchecked(&self, message: Message) -> RetraceResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let tx = conn.transaction().map_err(sql_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, title, created_at, last_activity, preview_text)
             VALUES (?1, NULL, ?2, NULL, NULL)",
            params![
                message.session_id.to_string(),
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        insert_message_row(&tx, &message)?;
        tx.commit().map_err(sql_err)?;
        Ok(())
    }

    fn load_session_messages(conn: &Connection, session_id: Uuid) -> RetraceResult<Vec<Message>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 ORDER BY rowid"
            ))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![session_id.to_string()], MessageRow::read)
            .map_err(sql_err)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(sql_err)?.into_message()?);
        }
        Ok(messages)
    }
}

fn insert_message_row(conn: &Connection, message: &Message) -> RetraceResult<()> {
    conn.execute(
        "INSERT INTO messages (id, session_id, previous_id, request, response, prior_state,
                               cumulative_input_length, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            message.id.to_string(),
            message.session_id.to_string(),
            message.previous_id.map(|id| id.to_string()),
            serde_json::to_string(&message.request)?,
            message
                .response
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            message
                .prior_state
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            message.cumulative_input_length.map(|n| n as i64),
            message.created_at.to_rfc3339(),
            message.updated_at.map(|ts| ts.to_rfc3339()),
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn list_sessions(&self) -> RetraceResult<Vec<Session>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, created_at, last_activity, preview_text
                 FROM sessions ORDER BY rowid",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    last_activity: row.get(3)?,
                    preview_text: row.get(4)?,
                })
            })
            .map_err(sql_err)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row.map_err(sql_err)?.into_session()?);
        }
        sessions.sort_by(|a, b| b.activity_instant().cmp(&a.activity_instant()));
        Ok(sessions)
    }

    async fn thread_tree(&self, session_id: Uuid) -> RetraceResult<Vec<Message>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![session_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        if exists.is_none() {
            return Err(RetraceError::SessionNotFound(session_id));
        }
        Self::load_session_messages(conn, session_id)
    }

    async fn recent_messages(&self, session_id: Uuid, limit: usize) -> RetraceResult<Vec<Message>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        let messages = Self::load_session_messages(conn, session_id)?;
        ThreadIndex::from_messages(messages).recent_window(limit)
    }

    async fn search_messages(
        &self,
        keyword: &str,
        session_id: Option<Uuid>,
    ) -> RetraceResult<Vec<Message>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        let candidates = match session_id {
            Some(sid) => Self::load_session_messages(conn, sid)?,
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY rowid"
                    ))
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], MessageRow::read).map_err(sql_err)?;
                let mut messages = Vec::new();
                for row in rows {
                    messages.push(row.map_err(sql_err)?.into_message()?);
                }
                messages
            }
        };
        let mut hits: Vec<Message> = candidates
            .into_iter()
            .filter(|m| m.matches_keyword(keyword))
            .collect();
        hits.sort_by_key(|m| m.created_at);
        Ok(hits)
    }

    async fn history_for_message(&self, message_id: Uuid) -> RetraceResult<Vec<Message>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(closed)?;
        let session_id: Option<String> = conn
            .query_row(
                "SELECT session_id FROM messages WHERE id = ?1",
                params![message_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        let Some(session_id) = session_id else {
            return Err(RetraceError::MessageNotFound(message_id));
        };
        let messages = Self::load_session_messages(conn, parse_uuid(&session_id)?)?;
        ThreadIndex::from_messages(messages).chain_to(message_id)
    }

    async fn close(&self) -> RetraceResult<()> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| RetraceError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}
