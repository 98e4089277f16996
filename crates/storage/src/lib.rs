//! Storage layer for tidkv
//!
//! This crate defines what the transaction engine needs from a backing
//! store, and ships an in-process implementation of it:
//! - VersionedStore / WatchSession: the adapter contract (GET, MGET, WATCH,
//!   conditional execution, scripting)
//! - CommitScript: the versioned atomic commit script
//! - MemoryStore: mutex-serialized keyspace with per-key revisions, so
//!   watches behave like a real server's

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod script;
pub mod traits;

pub use memory::{MemorySession, MemoryStats, MemoryStore};
pub use script::{CommitScript, ScriptHost, COMMIT_SCRIPT_VERSION, OP_DEL, OP_SET};
pub use traits::{ExecOutcome, VersionedStore, WatchSession};
