//! Core types for tidkv
//!
//! This crate defines the foundational types shared by every layer:
//! - Error / StoreError: error taxonomy
//! - Conflict: why an optimistic transaction lost
//! - KeySpace: names of the global counter and per-key version markers
//! - StagedWrite: buffered puts and tombstones
//! - TombstoneEncoding: how tombstones reach the commit script

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod write;

pub use error::{Conflict, Error, Result, StoreError, StoreResult};
pub use key::{
    encode_tid, parse_tid, KeyError, KeySpace, DEFAULT_MARKER_KEY, DEFAULT_TID_SUFFIX,
};
pub use write::{StagedWrite, TombstoneEncoding};
