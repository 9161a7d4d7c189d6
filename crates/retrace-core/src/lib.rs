//! Core types and error definitions for the Retrace conversation store.
//!
//! This crate provides the foundational types shared across all Retrace
//! crates: the session/message/checkpoint data model and the unified error
//! enum used by every store backend.
//!
//! # Main types
//!
//! - [`RetraceError`] — Unified error enum for all Retrace subsystems.
//! - [`RetraceResult`] — Convenience alias for `Result<T, RetraceError>`.
//! - [`Session`] — A conversation container with display bookkeeping.
//! - [`Message`] — One request/response exchange, linked to its predecessor.
//! - [`Payload`] — A request or response body (plain text or structured JSON).
//! - [`Checkpoint`] — A named rewind point referencing a message.

/// Checkpoint record and label defaulting.
pub mod checkpoint;
/// Message and payload types.
pub mod message;
/// Session record and display bookkeeping.
pub mod session;

pub use checkpoint::{Checkpoint, DEFAULT_CHECKPOINT_LABEL};
pub use message::{Message, Payload};
pub use session::Session;

use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Retrace store crates.
///
/// Zero-result lookups are not errors: reads return empty collections or
/// `None` and reserve these variants for invalid references, corrupted
/// links, and backend failures.
#[derive(Debug, thiserror::Error)]
pub enum RetraceError {
    /// A session identifier that no store record matches.
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// A message identifier that no store record matches.
    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    /// A write rejected before persistence (duplicate id, bad link, nil id).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A predecessor walk revisited a message it had already seen.
    #[error("Cycle detected at message {at}")]
    Cycle {
        /// The first message id encountered twice.
        at: Uuid,
    },

    /// A predecessor link points at a message the store no longer holds.
    ///
    /// Recoverable: `partial` carries the chain that was reachable, ordered
    /// oldest-first and still ending at the requested message, so callers
    /// can degrade to the suffix instead of failing outright.
    #[error("Broken chain: message {referrer} references missing message {missing}")]
    BrokenChain {
        /// The message whose `previous_id` is dangling.
        referrer: Uuid,
        /// The referenced id with no backing record.
        missing: Uuid,
        /// The reachable portion of the chain, oldest-first.
        partial: Vec<Message>,
    },

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend-level failure (database error, malformed persisted data,
    /// operation on a closed store).
    #[error("Storage error: {0}")]
    Storage(String),
}

/// A convenience `Result` alias using [`RetraceError`].
pub type RetraceResult<T> = Result<T, RetraceError>;
