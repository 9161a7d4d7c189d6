use retrace_checkpoint::{CheckpointRef, CheckpointStore};
use retrace_core::{Checkpoint, Message, RetraceError, RetraceResult};
use retrace_history::HistoryStore;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a restoration attempt.
///
/// Checkpoints outlive messages, so a checkpoint whose target has been
/// pruned is an expected condition, not a failure. Only corrupted state
/// (cycles) and backend failures surface as `Err`.
#[derive(Debug)]
pub enum RestoreOutcome {
    /// The checkpoint resolved and its message is live in history.
    Restored {
        /// The resolved checkpoint.
        checkpoint: Checkpoint,
        /// The live message to rewind to, re-read from history.
        message: Message,
    },
    /// No checkpoint matched the target.
    CheckpointNotFound,
    /// The checkpoint exists but its message has left the history store.
    MessageMissing {
        /// The dangling checkpoint, including any snapshot it captured.
        checkpoint: Checkpoint,
    },
}

/// Resolves `target` against the checkpoint store and rewinds to the
/// referenced message.
///
/// The message is re-read from history rather than taken from the
/// checkpoint's snapshot, so a restore always lands on live state. A
/// broken link *above* the target still restores — the target itself
/// exists and the damage only shortens its ancestry. A cycle propagates
/// as [`RetraceError::Cycle`].
pub async fn restore_checkpoint(
    history: &dyn HistoryStore,
    checkpoints: &dyn CheckpointStore,
    target: CheckpointRef,
    session_id: Option<Uuid>,
) -> RetraceResult<RestoreOutcome> {
    let Some(checkpoint) = checkpoints.retrieve_checkpoint(target, session_id).await? else {
        return Ok(RestoreOutcome::CheckpointNotFound);
    };

    match history.history_for_message(checkpoint.message_id).await {
        // The chain always ends at the requested message; an empty result
        // means it is gone.
        Ok(mut chain) => match chain.pop() {
            Some(message) => {
                info!(
                    checkpoint_id = %checkpoint.id,
                    message_id = %message.id,
                    "Checkpoint restored"
                );
                Ok(RestoreOutcome::Restored {
                    checkpoint,
                    message,
                })
            }
            None => Ok(RestoreOutcome::MessageMissing { checkpoint }),
        },
        Err(RetraceError::MessageNotFound(_)) => {
            warn!(
                checkpoint_id = %checkpoint.id,
                message_id = %checkpoint.message_id,
                "Checkpoint target message is gone"
            );
            Ok(RestoreOutcome::MessageMissing { checkpoint })
        }
        Err(RetraceError::BrokenChain {
            mut partial,
            missing,
            ..
        }) => match partial.pop() {
            Some(message) => {
                warn!(
                    checkpoint_id = %checkpoint.id,
                    missing = %missing,
                    "Restoring to a message with truncated ancestry"
                );
                Ok(RestoreOutcome::Restored {
                    checkpoint,
                    message,
                })
            }
            None => Ok(RestoreOutcome::MessageMissing { checkpoint }),
        },
        Err(e) => Err(e),
    }
}
