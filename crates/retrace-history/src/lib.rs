//! Session bookkeeping and message-thread reconstruction for Retrace.
//!
//! Messages form a per-session forest linked by `previous_id`. This crate
//! rebuilds ordered threads from that graph: full ancestor chains ending at
//! an arbitrary message, windows of recent context along the canonical path,
//! and flat per-session trees for callers that reconstruct branches
//! themselves.
//!
//! # Main types
//!
//! - [`HistoryStore`] — The store contract: session listing, thread
//!   reconstruction, search, and the backward chain walk.
//! - [`ThreadIndex`] — Arena of messages keyed by id; the shared walk and
//!   leaf-selection algorithms all backends delegate to.
//! - [`InMemoryHistoryStore`] — `RwLock`-guarded in-process backend.
//! - [`FileHistoryStore`] — JSON/JSONL-on-disk backend wrapping the
//!   in-memory store.
//! - [`SqliteHistoryStore`] — SQLite backend, behind the `sqlite` feature.

/// File-backed store: per-session metadata JSON plus append-only JSONL.
pub mod file;
/// In-memory store guarded by a single `RwLock`.
pub mod memory;
/// SQLite-backed store.
#[cfg(feature = "sqlite")]
pub mod sqlite;
/// The `HistoryStore` contract.
pub mod store;
/// Message arena and the chain-walk algorithms.
pub mod thread;

pub use file::FileHistoryStore;
pub use memory::InMemoryHistoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistoryStore;
pub use store::{HistoryStore, DEFAULT_RECENT_LIMIT};
pub use thread::ThreadIndex;
