//! Named rewind points for Retrace conversations.
//!
//! A checkpoint pins a message id so the conversation can later be rewound
//! to that exchange. Checkpoints are independent of the history store: they
//! share message identifiers with it but never call into it, and they
//! outlive the messages they reference (resolving that is the restoration
//! protocol's job).
//!
//! # Main types
//!
//! - [`CheckpointStore`] — The store contract: create, retrieve by id or
//!   position, list newest-first.
//! - [`CheckpointRef`] — A retrieval target parsed from user input, either
//!   a positional index or an exact id.
//! - [`InMemoryCheckpointStore`] — `RwLock`-guarded in-process backend.
//! - [`FileCheckpointStore`] — Append-only JSONL backend.
//! - [`SqliteCheckpointStore`] — SQLite backend, behind the `sqlite`
//!   feature.

/// Append-only JSONL backend.
pub mod file;
/// In-memory backend.
pub mod memory;
/// SQLite backend.
#[cfg(feature = "sqlite")]
pub mod sqlite;
/// The `CheckpointStore` contract.
pub mod store;
/// Typed retrieval targets.
pub mod target;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;
pub use store::CheckpointStore;
pub use target::CheckpointRef;
