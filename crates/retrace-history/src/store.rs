use async_trait::async_trait;
use retrace_core::{Message, RetraceResult, Session};
use uuid::Uuid;

/// Window size used by callers that do not pass an explicit limit to
/// [`HistoryStore::recent_messages`].
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Contract for conversation-history backends.
///
/// The store is a graph-query surface over an append-mostly dataset. Reads
/// are safe to run concurrently with appends and observe a consistent
/// snapshot at call time; zero-result reads return empty collections, never
/// errors. Backends expose their own inherent write operations.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All sessions, most-recently-active first (`last_activity`, falling
    /// back to `created_at`).
    async fn list_sessions(&self) -> RetraceResult<Vec<Session>>;

    /// Every message of the session, enough to rebuild the branching thread
    /// by indexing on `id` and `previous_id`.
    ///
    /// Array order carries no meaning in this contract. Fails with
    /// [`RetraceError::SessionNotFound`] only when the session itself is
    /// absent; a session with no messages yields an empty vec.
    ///
    /// [`RetraceError::SessionNotFound`]: retrace_core::RetraceError::SessionNotFound
    async fn thread_tree(&self, session_id: Uuid) -> RetraceResult<Vec<Message>>;

    /// At most `limit` messages from the canonical path (the most recently
    /// active leaf's ancestry), oldest-first.
    ///
    /// `limit == 0` and unknown sessions both yield an empty vec. A broken
    /// link deep in the path degrades to the reachable suffix; a cycle is a
    /// hard [`RetraceError::Cycle`].
    ///
    /// [`RetraceError::Cycle`]: retrace_core::RetraceError::Cycle
    async fn recent_messages(&self, session_id: Uuid, limit: usize) -> RetraceResult<Vec<Message>>;

    /// Case-insensitive substring search over request and response text,
    /// optionally scoped to one session.
    ///
    /// Structured payloads are serialized to text before matching. Results
    /// come back in ascending `created_at` order, ties in insertion order.
    async fn search_messages(
        &self,
        keyword: &str,
        session_id: Option<Uuid>,
    ) -> RetraceResult<Vec<Message>>;

    /// The full ancestor chain ending at and including `message_id`,
    /// root-first.
    ///
    /// Walks `previous_id` links backward until a root. Fails with
    /// [`RetraceError::MessageNotFound`] when the id is unknown,
    /// [`RetraceError::Cycle`] when the walk revisits an id, and
    /// [`RetraceError::BrokenChain`] (carrying the reachable partial chain)
    /// when a link points at a missing message.
    ///
    /// [`RetraceError::MessageNotFound`]: retrace_core::RetraceError::MessageNotFound
    /// [`RetraceError::Cycle`]: retrace_core::RetraceError::Cycle
    /// [`RetraceError::BrokenChain`]: retrace_core::RetraceError::BrokenChain
    async fn history_for_message(&self, message_id: Uuid) -> RetraceResult<Vec<Message>>;

    /// Releases held resources. Idempotent; backends holding none keep this
    /// no-op default.
    async fn close(&self) -> RetraceResult<()> {
        Ok(())
    }
}
