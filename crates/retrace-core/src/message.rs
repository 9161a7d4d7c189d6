use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request or response body.
///
/// Conversation payloads are either plain text or structured JSON (tool
/// calls, rich content). The untagged representation keeps persisted form
/// identical to the value itself: text serializes as a JSON string,
/// structured data as the JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Plain text.
    Text(String),
    /// Structured JSON data.
    Structured(serde_json::Value),
}

impl Payload {
    /// The text form used for keyword search and previews.
    ///
    /// Structured payloads are rendered as compact JSON so their field
    /// names and values are searchable too.
    pub fn search_text(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Structured(value) => value.to_string(),
        }
    }

    /// Byte length of the text form, used for cumulative input accounting.
    pub fn input_len(&self) -> u64 {
        self.search_text().len() as u64
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Structured(value)
    }
}

/// One request/response exchange within a session.
///
/// Messages form a forest per session: `previous_id` links each message to
/// its predecessor, roots have none, and multiple messages may share a
/// predecessor when the conversation branches (edits, checkpoint rewinds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// The predecessor message in the same session, if any.
    pub previous_id: Option<Uuid>,
    /// The user-side input of the exchange.
    pub request: Payload,
    /// The agent-side output, absent while the exchange is in flight.
    pub response: Option<Payload>,
    /// Opaque agent state captured before this exchange ran.
    pub prior_state: Option<serde_json::Value>,
    /// Total input bytes along the chain up to and including this message.
    pub cumulative_input_length: Option<u64>,
    /// UTC timestamp of when the message was created.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the last edit, absent if never edited.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a root message (no predecessor) in the given session.
    pub fn new(session_id: Uuid, request: impl Into<Payload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            previous_id: None,
            request: request.into(),
            response: None,
            prior_state: None,
            cumulative_input_length: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Creates a message that continues from `parent`.
    pub fn reply_to(parent: &Message, request: impl Into<Payload>) -> Self {
        let mut message = Self::new(parent.session_id, request);
        message.previous_id = Some(parent.id);
        message
    }

    /// Attaches the agent response, marking the message as edited.
    pub fn with_response(mut self, response: impl Into<Payload>) -> Self {
        self.response = Some(response.into());
        self.updated_at = Some(Utc::now());
        self
    }

    /// Attaches captured agent state.
    pub fn with_prior_state(mut self, state: serde_json::Value) -> Self {
        self.prior_state = Some(state);
        self
    }

    /// True when either side of the exchange contains `needle`,
    /// case-insensitively.
    pub fn matches_keyword(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if self.request.search_text().to_lowercase().contains(&needle) {
            return true;
        }
        self.response
            .as_ref()
            .is_some_and(|r| r.search_text().to_lowercase().contains(&needle))
    }
}
