use crate::store::HistoryStore;
use crate::thread::ThreadIndex;
use async_trait::async_trait;
use retrace_core::{Message, RetraceError, RetraceResult, Session};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct HistoryState {
    sessions: Vec<Session>,
    session_slots: HashMap<Uuid, usize>,
    messages: ThreadIndex,
}

impl HistoryState {
    fn session_mut(&mut self, id: Uuid) -> Option<&mut Session> {
        let slot = self.session_slots.get(&id).copied()?;
        self.sessions.get_mut(slot)
    }

    fn insert_session(&mut self, session: Session) {
        self.session_slots.insert(session.id, self.sessions.len());
        self.sessions.push(session);
    }

    /// Makes sure a session record exists for `id`, creating a bare one
    /// stamped with `created_at` when it does not.
    fn ensure_session(&mut self, id: Uuid, created_at: chrono::DateTime<chrono::Utc>) {
        if !self.session_slots.contains_key(&id) {
            self.insert_session(Session {
                id,
                title: None,
                created_at,
                last_activity: None,
                preview_text: None,
            });
        }
    }

    fn session_index(&self, session_id: Uuid) -> ThreadIndex {
        ThreadIndex::from_messages(
            self.messages
                .messages()
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned(),
        )
    }
}

/// In-memory history store guarded by a single `RwLock`.
///
/// Writes are serialized store-wide, which more than satisfies the
/// per-session ordering the contract requires; reads take a snapshot under
/// the read lock and never observe a half-appended message.
pub struct InMemoryHistoryStore {
    state: RwLock<HistoryState>,
}

impl InMemoryHistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HistoryState::default()),
        }
    }

    /// Creates a session up front, before any message is appended.
    pub async fn create_session(&self, title: Option<&str>) -> RetraceResult<Session> {
        let session = match title {
            Some(title) => Session::with_title(title),
            None => Session::new(),
        };
        let mut state = self.state.write().await;
        state.insert_session(session.clone());
        Ok(session)
    }

    /// Imports an existing session record, as persisted backends do when
    /// loading. Fails on a duplicate id.
    pub async fn insert_session(&self, session: Session) -> RetraceResult<()> {
        let mut state = self.state.write().await;
        if state.session_slots.contains_key(&session.id) {
            return Err(RetraceError::InvalidArgument(format!(
                "session {} already exists",
                session.id
            )));
        }
        state.insert_session(session);
        Ok(())
    }

    /// A snapshot of one session record.
    pub async fn session(&self, id: Uuid) -> Option<Session> {
        let state = self.state.read().await;
        state
            .session_slots
            .get(&id)
            .map(|&slot| state.sessions[slot].clone())
    }

    /// Appends a message through the validated write path.
    ///
    /// Rejects with [`RetraceError::InvalidArgument`] before any state
    /// change: nil or duplicate ids, predecessors that are absent, belong to
    /// another session, or were created after this message. On success the
    /// owning session is created if new, its activity bookkeeping is
    /// updated, and a missing `cumulative_input_length` is filled from the
    /// predecessor's running total. Returns the message as stored.
    pub async fn append_message(&self, message: Message) -> RetraceResult<Message> {
        let mut state = self.state.write().await;
        let mut message = message;

        if message.id.is_nil() {
            return Err(RetraceError::InvalidArgument(
                "message id must not be nil".to_string(),
            ));
        }
        if state.messages.contains(message.id) {
            return Err(RetraceError::InvalidArgument(format!(
                "message {} already exists",
                message.id
            )));
        }

        let mut parent_total: u64 = 0;
        if let Some(previous_id) = message.previous_id {
            let Some(parent) = state.messages.get(previous_id) else {
                return Err(RetraceError::InvalidArgument(format!(
                    "previous message {previous_id} does not exist"
                )));
            };
            if parent.session_id != message.session_id {
                return Err(RetraceError::InvalidArgument(format!(
                    "previous message {previous_id} belongs to another session"
                )));
            }
            if parent.created_at > message.created_at {
                return Err(RetraceError::InvalidArgument(format!(
                    "previous message {previous_id} was created after this one"
                )));
            }
            parent_total = parent.cumulative_input_length.unwrap_or(0);
        }

        if message.cumulative_input_length.is_none() {
            message.cumulative_input_length = Some(parent_total + message.request.input_len());
        }

        state.ensure_session(message.session_id, message.created_at);
        if let Some(session) = state.session_mut(message.session_id) {
            session.record_activity(message.created_at, &message.request.search_text());
        }

        state.messages.push(message.clone());
        Ok(message)
    }

    /// Inserts a message without link validation or session bookkeeping.
    ///
    /// This is the bulk-load path: persisted graphs may legitimately hold
    /// dangling predecessor links (history pruned out from under a
    /// checkpoint), and reload must accept them as-is. A bare session
    /// record is still created when none exists so the message stays
    /// reachable through session-scoped reads.
    pub async fn insert_message_unchecked(&self, message: Message) -> RetraceResult<()> {
        let mut state = self.state.write().await;
        state.ensure_session(message.session_id, message.created_at);
        state.messages.push(message);
        Ok(())
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn list_sessions(&self) -> RetraceResult<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions = state.sessions.clone();
        sessions.sort_by(|a, b| b.activity_instant().cmp(&a.activity_instant()));
        Ok(sessions)
    }

    async fn thread_tree(&self, session_id: Uuid) -> RetraceResult<Vec<Message>> {
        let state = self.state.read().await;
        if !state.session_slots.contains_key(&session_id) {
            return Err(RetraceError::SessionNotFound(session_id));
        }
        Ok(state
            .messages
            .messages()
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn recent_messages(&self, session_id: Uuid, limit: usize) -> RetraceResult<Vec<Message>> {
        let state = self.state.read().await;
        state.session_index(session_id).recent_window(limit)
    }

    async fn search_messages(
        &self,
        keyword: &str,
        session_id: Option<Uuid>,
    ) -> RetraceResult<Vec<Message>> {
        let state = self.state.read().await;
        let mut hits: Vec<Message> = state
            .messages
            .messages()
            .iter()
            .filter(|m| {
                if let Some(sid) = session_id {
                    m.session_id == sid
                } else {
                    true
                }
            })
            .filter(|m| m.matches_keyword(keyword))
            .cloned()
            .collect();
        hits.sort_by_key(|m| m.created_at);
        Ok(hits)
    }

    async fn history_for_message(&self, message_id: Uuid) -> RetraceResult<Vec<Message>> {
        let state = self.state.read().await;
        state.messages.chain_to(message_id)
    }
}
