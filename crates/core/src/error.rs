//! Error types for tidkv
//!
//! Two layers of errors exist:
//! - [`StoreError`]: anything that went wrong inside the backing store or the
//!   adapter talking to it. The transaction layer never classifies these, it
//!   passes them through verbatim.
//! - [`Error`]: what transaction callers see. Conflicts are the only
//!   retryable kind.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::key::KeyError;
use thiserror::Error;

/// Result type alias for transaction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for store adapter operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a backing store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store connection was closed
    #[error("store connection is closed")]
    Closed,

    /// Connectivity failure talking to the store
    #[error("connection error: {0}")]
    Connection(String),

    /// The store replied with something the adapter did not expect
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A server-side script failed for a reason other than a watch abort
    #[error("script error: {0}")]
    Script(String),

    /// A counter or version marker holds something that is not a tid
    #[error("invalid tid stored at {key}: {raw:?}")]
    InvalidTid {
        /// Key holding the malformed value
        key: String,
        /// Raw stored bytes, lossily decoded
        raw: String,
    },
}

/// Why a transaction lost its optimistic race
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// A read observed a version newer than the transaction's snapshot
    ///
    /// The value that was read is kept so callers can inspect it.
    StaleRead {
        /// Key that was read
        key: String,
        /// Version marker found on the key
        tid: u64,
        /// Snapshot the transaction started from
        marker_tid: u64,
        /// Value read alongside the newer version marker
        value: Option<Vec<u8>>,
    },

    /// The store aborted the commit because a watched key changed
    WatchAborted,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::StaleRead {
                key,
                tid,
                marker_tid,
                ..
            } => write!(
                f,
                "{} was written at tid {} after snapshot {}",
                key, tid, marker_tid
            ),
            Conflict::WatchAborted => write!(f, "watched key changed before commit"),
        }
    }
}

/// Error types for tidkv transactions
#[derive(Debug, Error)]
pub enum Error {
    /// Another transaction committed a write this transaction depends on
    ///
    /// Retry the whole transaction body from scratch.
    #[error("key conflict: {0}")]
    Conflict(Conflict),

    /// A write was attempted on a read-only transaction
    #[error("transaction is not writable")]
    ReadOnlyTx,

    /// The key collides with the transaction bookkeeping keys
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// The backing store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The transaction already finished (committed, rolled back or timed out)
    #[error("transaction is closed")]
    TransactionClosed,

    /// The caller aborted the transaction
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create an application abort error
    pub fn aborted(reason: impl Into<String>) -> Self {
        Error::Aborted {
            reason: reason.into(),
        }
    }

    /// Whether retrying the transaction from scratch may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// The value read by a `get` that reported a stale-read conflict
    ///
    /// Returns `None` for every other error, and for stale reads of
    /// absent keys.
    pub fn stale_value(&self) -> Option<&[u8]> {
        match self {
            Error::Conflict(Conflict::StaleRead { value, .. }) => value.as_deref(),
            _ => None,
        }
    }
}

impl From<Conflict> for Error {
    fn from(conflict: Conflict) -> Self {
        Error::Conflict(conflict)
    }
}
