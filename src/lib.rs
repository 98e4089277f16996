//! tidkv - Optimistic multi-key transactions over a watch-capable key-value store
//!
//! Each transaction reads a snapshot tid from a global counter, reads keys
//! together with their per-key version markers, buffers its writes, and
//! commits them with one atomic script guarded by store watches. A read of
//! a key written after the snapshot, or a watched key changing before
//! commit, is reported as a conflict the caller may retry.
//!
//! # Quick Start
//!
//! ```ignore
//! use tidkv::{Database, MemoryStore};
//!
//! let db = Database::new(MemoryStore::new());
//!
//! db.update(|txn| Box::pin(async move {
//!     txn.set("user:123", "Alice")?;
//!     txn.set("users:count", "1")
//! }))
//! .await?;
//!
//! let name = db.view(|txn| Box::pin(async move { txn.get("user:123").await })).await?;
//! ```
//!
//! # Architecture
//!
//! - `tidkv-core`: errors, key naming, staged writes
//! - `tidkv-storage`: store contract, commit script, in-process store
//! - `tidkv-concurrency`: per-transaction actor and handle
//! - `tidkv-engine`: database handle, closure transactions, configuration

pub use tidkv_concurrency::{PendingOperations, Transaction, TransactionState};
pub use tidkv_core::{
    Conflict, Error, KeyError, KeySpace, Result, StoreError, StoreResult, TombstoneEncoding,
};
pub use tidkv_engine::{Database, DatabaseConfig, RetryConfig, CONFIG_FILE_NAME};
pub use tidkv_storage::{
    CommitScript, ExecOutcome, MemoryStats, MemoryStore, VersionedStore, WatchSession,
};
