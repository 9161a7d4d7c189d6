//! Checkpoint restoration over the Retrace stores.
//!
//! The store crates hold data; this crate is the caller side that ties them
//! together: resolve a checkpoint, re-read its message from history, and
//! move the conversation pointer. Restoration separates ordinary data drift
//! (checkpoint or target message gone) from corruption (cycles): drift is
//! an outcome, corruption is an error.
//!
//! # Main types
//!
//! - [`restore_checkpoint`] — Resolves a checkpoint and rewinds to its
//!   message.
//! - [`RestoreOutcome`] — Three-way result: restored, checkpoint not
//!   found, or message missing.
//! - [`Cursor`] — The caller-owned current-message pointer.
//! - [`checkpoint_current`] — Pins the cursor's message as a new
//!   checkpoint.

/// The conversation pointer and checkpoint creation from it.
pub mod cursor;
/// Checkpoint resolution and rewind.
pub mod restore;

pub use cursor::{checkpoint_current, Cursor};
pub use restore::{restore_checkpoint, RestoreOutcome};
