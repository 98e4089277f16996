//! Concurrency layer for tidkv
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - Transaction: caller handle with a private write buffer
//! - Transaction actor: one task per transaction owning the store session
//! - Conflict detection on read (version marker newer than the snapshot)
//! - Conflict detection at commit (store watches)
//! - Atomic commit through a single server-side script

#![warn(missing_docs)]
#![warn(clippy::all)]

mod actor;
mod protocol;
pub mod transaction;

pub use transaction::{PendingOperations, Transaction, TransactionOptions, TransactionState};
