use retrace_checkpoint::CheckpointStore;
use retrace_core::{Checkpoint, Message, RetraceError, RetraceResult};
use tracing::info;

/// The caller-owned pointer to a conversation's current message.
///
/// The stores never track position. The agent runtime owns the pointer and
/// moves it forward by appending or backward by restoring; an empty cursor
/// means no active conversation.
#[derive(Debug, Default)]
pub struct Cursor {
    current: Option<Message>,
}

impl Cursor {
    /// Creates an empty cursor.
    pub fn new() -> Self {
        Self { current: None }
    }

    /// The message the conversation is currently at.
    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    /// Moves the pointer forward to a newly appended message.
    pub fn advance(&mut self, message: Message) {
        self.current = Some(message);
    }

    /// Moves the pointer back to a restored message. Nothing is deleted:
    /// the abandoned branch stays in history and new appends fork from
    /// here.
    pub fn rewind_to(&mut self, message: Message) {
        self.current = Some(message);
    }

    /// Clears the pointer, leaving no active conversation.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Pins the cursor's current message as a new checkpoint.
///
/// Fails with [`RetraceError::InvalidArgument`] when the cursor is empty:
/// there is no active message to pin.
pub async fn checkpoint_current(
    cursor: &Cursor,
    checkpoints: &dyn CheckpointStore,
    label: &str,
) -> RetraceResult<Checkpoint> {
    let Some(current) = cursor.current() else {
        return Err(RetraceError::InvalidArgument(
            "no active message to checkpoint".to_string(),
        ));
    };
    let checkpoint = checkpoints.create_checkpoint(label, current).await?;
    info!(
        checkpoint_id = %checkpoint.id,
        message_id = %checkpoint.message_id,
        "Checkpoint created"
    );
    Ok(checkpoint)
}
