use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters kept in [`Session::preview_text`].
pub const PREVIEW_MAX_CHARS: usize = 80;

/// A conversation container.
///
/// Sessions are created explicitly or implicitly by the first message
/// appended under their id. `last_activity` and `preview_text` are
/// bookkeeping maintained on append; checkpoint operations never touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    pub id: Uuid,
    /// Human-readable title, absent until a caller assigns one.
    pub title: Option<String>,
    /// UTC timestamp of when the session was created.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the most recent appended message, if any.
    pub last_activity: Option<DateTime<Utc>>,
    /// Short excerpt of the most recent request, for listing UIs.
    pub preview_text: Option<String>,
}

impl Session {
    /// Creates an untitled session.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            created_at: Utc::now(),
            last_activity: None,
            preview_text: None,
        }
    }

    /// Creates a session with the given title.
    pub fn with_title(title: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.title = Some(title.into());
        session
    }

    /// The title to display: the assigned one, or one derived from the id.
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => format!("Session {}", self.id),
        }
    }

    /// Records an appended message: bumps `last_activity` and replaces
    /// `preview_text` with a truncated excerpt of the request.
    pub fn record_activity(&mut self, at: DateTime<Utc>, request_text: &str) {
        self.last_activity = Some(at);
        self.preview_text = Some(request_text.chars().take(PREVIEW_MAX_CHARS).collect());
    }

    /// The instant used to order sessions most-recently-active first.
    pub fn activity_instant(&self) -> DateTime<Utc> {
        self.last_activity.unwrap_or(self.created_at)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_title_falls_back_to_id() {
        let session = Session::new();
        assert_eq!(session.display_title(), format!("Session {}", session.id));

        let titled = Session::with_title("Trip planning");
        assert_eq!(titled.display_title(), "Trip planning");
    }

    #[test]
    fn record_activity_truncates_preview() {
        let mut session = Session::new();
        let long = "x".repeat(200);
        session.record_activity(Utc::now(), &long);
        let preview = session.preview_text.unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn preview_truncation_respects_char_boundaries() {
        let mut session = Session::new();
        let long = "é".repeat(200);
        session.record_activity(Utc::now(), &long);
        let preview = session.preview_text.unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn activity_instant_prefers_last_activity() {
        let mut session = Session::new();
        assert_eq!(session.activity_instant(), session.created_at);

        let later = session.created_at + chrono::Duration::seconds(10);
        session.record_activity(later, "hello");
        assert_eq!(session.activity_instant(), later);
    }
}
