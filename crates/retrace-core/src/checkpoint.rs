use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label applied when a checkpoint is created with a blank one.
pub const DEFAULT_CHECKPOINT_LABEL: &str = "New Checkpoint";

/// A named rewind point.
///
/// A checkpoint references the message that was current when it was taken.
/// `message` is a denormalized snapshot of that message at creation time; it
/// never tracks later edits, and the authoritative record stays in the
/// history store. Checkpoints outlive their target: pruning history leaves
/// the checkpoint behind, which restoration reports as a distinct condition
/// rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier for this checkpoint.
    pub id: Uuid,
    /// Display label, never empty.
    pub label: String,
    /// The message that was current when the checkpoint was taken.
    pub message_id: Uuid,
    /// The session the target message belonged to.
    pub session_id: Uuid,
    /// Snapshot of the target message at creation time.
    pub message: Option<Message>,
    /// UTC timestamp of when the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Captures a checkpoint of `current`.
    ///
    /// A label that is empty or whitespace-only is replaced with
    /// [`DEFAULT_CHECKPOINT_LABEL`].
    pub fn capture(label: &str, current: &Message) -> Self {
        let label = label.trim();
        Self {
            id: Uuid::new_v4(),
            label: if label.is_empty() {
                DEFAULT_CHECKPOINT_LABEL.to_string()
            } else {
                label.to_string()
            },
            message_id: current.id,
            session_id: current.session_id,
            message: Some(current.clone()),
            created_at: Utc::now(),
        }
    }
}
