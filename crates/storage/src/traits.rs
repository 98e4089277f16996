//! Store adapter contract
//!
//! The transaction engine only needs a handful of primitives from the
//! backing store. Each is a pass-through to the store's native command with
//! no policy of its own:
//!
//! | primitive | native command |
//! |---|---|
//! | [`VersionedStore::get`] | `GET key` |
//! | [`VersionedStore::mget`] / [`WatchSession::mget`] | `MGET key...` |
//! | [`WatchSession::watch`] | `WATCH key...` |
//! | [`WatchSession::exec_script`] | `MULTI` + `EVAL` + `EXEC` |
//! | [`WatchSession::unwatch`] | `UNWATCH` |
//!
//! Absent keys are `None`, never an empty value.

use async_trait::async_trait;
use tidkv_core::StoreResult;

use crate::script::CommitScript;

/// Outcome of a conditional execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The script ran; carries the tid it allocated
    Applied(u64),
    /// A watched key changed, nothing ran
    WatchFailed,
}

/// A backing store connection (or pool) shared by many transactions
#[async_trait]
pub trait VersionedStore: Send + Sync + 'static {
    /// Session type with its own watch state
    type Session: WatchSession;

    /// Get the value of one key
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Get several keys in one round trip, in order
    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Open a conditional-execution session
    ///
    /// Sessions are single-owner. Watches registered on one session never
    /// affect another.
    async fn session(&self) -> StoreResult<Self::Session>;

    /// Release the connection
    ///
    /// Every later call, on the store or its sessions, fails with
    /// [`StoreError::Closed`](tidkv_core::StoreError::Closed).
    async fn close(&self) -> StoreResult<()>;
}

/// A session that owns watches and runs conditional executions
///
/// Not safe for concurrent use: one transaction actor owns each session.
#[async_trait]
pub trait WatchSession: Send + 'static {
    /// Watch keys; a later [`exec_script`](Self::exec_script) fails if any of
    /// them changes in between
    async fn watch(&mut self, keys: &[String]) -> StoreResult<()>;

    /// Get several keys in one round trip, outside any conditional execution
    async fn mget(&mut self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Run the commit script guarded by the session's watches
    ///
    /// All watches are released afterwards, whatever the outcome.
    ///
    /// # Errors
    ///
    /// A script failure is an error. A watch violation is not: it is
    /// reported as [`ExecOutcome::WatchFailed`].
    async fn exec_script(
        &mut self,
        script: &CommitScript,
        keys: &[String],
        args: &[Vec<u8>],
    ) -> StoreResult<ExecOutcome>;

    /// Drop every watch held by the session
    async fn unwatch(&mut self) -> StoreResult<()>;
}
