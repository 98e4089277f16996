//! Transaction handle
//!
//! A [`Transaction`] is the caller's side of a transaction actor. Reads and
//! commits travel to the actor over a one-slot channel; writes are buffered
//! here and shipped to the actor with the commit.
//!
//! # Read-Your-Writes Semantics
//!
//! When reading a key, the transaction checks in order:
//! 1. **write buffer**: returns the staged value (or `None` for a staged
//!    delete) without any store I/O
//! 2. **store**: asks the actor for a conflict-aware read
//!
//! # Lifecycle
//!
//! 1. **BEGIN**: created by `Database::begin`, state `Running`
//! 2. **READ/WRITE**: `get()`, `set()`, `remove()`
//! 3. **COMMIT/ROLLBACK**: `commit()` or `rollback()`; dropping the handle
//!    rolls back

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use tidkv_core::{Error, KeySpace, Result, StagedWrite};
use tidkv_storage::{CommitScript, WatchSession};

use crate::actor::{Command, Teardown, TransactionActor};

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Running` → `Committed` (commit succeeded)
/// - `Running` → `RolledBack` (rollback, failed commit, deadline, or the
///   actor went away)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `RolledBack`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Serving reads, writes and commit
    Running,
    /// Commit succeeded
    Committed,
    /// Finished without committing
    RolledBack,
}

/// Summary of staged writes that commit would apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of staged puts
    pub puts: usize,
    /// Number of staged deletes
    pub deletes: usize,
}

impl PendingOperations {
    /// Total number of staged writes
    pub fn total(&self) -> usize {
        self.puts + self.deletes
    }

    /// Check if nothing is staged
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Parameters fixed at transaction start
#[derive(Debug, Clone, Copy)]
pub struct TransactionOptions {
    /// Whether writes are allowed
    pub writable: bool,
    /// Highest tid visible to the transaction
    pub marker_tid: u64,
    /// When the transaction is rolled back if still running
    pub deadline: Option<Instant>,
}

/// An optimistic transaction
///
/// Single owner: methods take `&mut self`, so at most one operation is in
/// flight. Dropping the handle rolls the transaction back.
#[derive(Debug)]
pub struct Transaction {
    commands: mpsc::Sender<Command>,
    cancel: Option<oneshot::Sender<()>>,
    /// Staged writes; `None` for read-only transactions
    writes: Option<BTreeMap<String, StagedWrite>>,
    key_space: KeySpace,
    marker_tid: u64,
    state: TransactionState,
}

impl Transaction {
    /// Spawn the actor for a new transaction and return its handle
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `session` - Store session the actor will own
    /// * `script` - Commit script to run at commit
    /// * `options` - Snapshot, writability and deadline
    pub fn start<W: WatchSession>(
        session: W,
        script: Arc<CommitScript>,
        options: TransactionOptions,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(1);
        let (cancel, cancel_rx) = oneshot::channel();
        let key_space = script.key_space().clone();

        let actor = TransactionActor::new(session, script, options.marker_tid);
        tokio::spawn(actor.run(command_rx, Teardown::new(cancel_rx, options.deadline)));

        debug!(
            marker_tid = options.marker_tid,
            writable = options.writable,
            "transaction started"
        );

        Transaction {
            commands,
            cancel: Some(cancel),
            writes: options.writable.then(BTreeMap::new),
            key_space,
            marker_tid: options.marker_tid,
            state: TransactionState::Running,
        }
    }

    /// Snapshot tid captured at begin
    pub fn marker_tid(&self) -> u64 {
        self.marker_tid
    }

    /// Whether this transaction accepts writes
    pub fn is_writable(&self) -> bool {
        self.writes.is_some()
    }

    /// Current lifecycle state
    ///
    /// A deadline expiry is only noticed by the next operation.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Writes that commit would apply
    pub fn pending(&self) -> PendingOperations {
        let mut pending = PendingOperations::default();
        for write in self.writes.iter().flat_map(BTreeMap::values) {
            if write.is_delete() {
                pending.deletes += 1;
            } else {
                pending.puts += 1;
            }
        }
        pending
    }

    // === Read Operations ===

    /// Read a key
    ///
    /// Staged writes are returned without store I/O. Otherwise the key is
    /// watched (first read only) and read together with its version marker.
    ///
    /// # Errors
    /// - `Error::Conflict` if the key was written after this transaction's
    ///   snapshot; the value read is available via [`Error::stale_value`]
    /// - `Error::InvalidKey` for bookkeeping keys
    /// - `Error::Store` on store failures
    /// - `Error::TransactionClosed` once the transaction finished
    pub async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_running()?;
        self.key_space.validate(key)?;

        if let Some(write) = self.writes.as_ref().and_then(|w| w.get(key)) {
            return Ok(write.visible_value().map(<[u8]>::to_vec));
        }

        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::Get {
            key: key.to_string(),
            reply,
        })
        .await?;
        self.receive(reply_rx).await
    }

    // === Write Operations ===

    /// Stage a write, replacing anything staged for the key
    ///
    /// Nothing reaches the store before commit.
    ///
    /// # Errors
    /// - `Error::ReadOnlyTx` on read-only transactions
    /// - `Error::InvalidKey` for bookkeeping keys
    /// - `Error::TransactionClosed` once the transaction finished
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<()> {
        self.stage(key.into(), StagedWrite::Put(value.into()))
    }

    /// Stage a delete
    ///
    /// Same errors as [`set`](Self::set).
    pub fn remove(&mut self, key: impl Into<String>) -> Result<()> {
        self.stage(key.into(), StagedWrite::Delete)
    }

    fn stage(&mut self, key: String, write: StagedWrite) -> Result<()> {
        if self.writes.is_none() {
            return Err(Error::ReadOnlyTx);
        }
        self.key_space.validate(&key)?;
        self.ensure_running()?;
        if let Some(writes) = self.writes.as_mut() {
            writes.insert(key, write);
        }
        Ok(())
    }

    // === Commit / Rollback ===

    /// Apply every staged write atomically
    ///
    /// The actor finishes whatever the outcome. Once the actor has taken
    /// the commit, a deadline or rollback no longer interrupts it: the reply
    /// always reports what the store did.
    ///
    /// # Returns
    /// - `Ok(Some(tid))` - writes are visible at `tid`
    /// - `Ok(None)` - nothing was staged, the store was not touched
    ///
    /// # Errors
    /// - `Error::Conflict` if a watched key changed since it was read
    /// - `Error::Store` on store failures (nothing was applied)
    /// - `Error::TransactionClosed` once the transaction finished
    pub async fn commit(&mut self) -> Result<Option<u64>> {
        self.ensure_running()?;
        let writes = self.writes.as_mut().map(std::mem::take).unwrap_or_default();

        let (reply, reply_rx) = oneshot::channel();
        let result = match self.send(Command::Commit { writes, reply }).await {
            Ok(()) => self.receive(reply_rx).await,
            Err(e) => Err(e),
        };

        self.state = match result {
            Ok(_) => TransactionState::Committed,
            Err(_) => TransactionState::RolledBack,
        };
        self.cancel = None;
        result
    }

    /// Abandon the transaction
    ///
    /// Idempotent and safe after commit; never fails.
    pub fn rollback(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            // The actor may already be gone
            let _ = cancel.send(());
        }
        if self.state == TransactionState::Running {
            self.state = TransactionState::RolledBack;
        }
        if let Some(writes) = self.writes.as_mut() {
            writes.clear();
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state {
            TransactionState::Running => Ok(()),
            _ => Err(Error::TransactionClosed),
        }
    }

    async fn send(&mut self, command: Command) -> Result<()> {
        if self.commands.send(command).await.is_err() {
            self.state = TransactionState::RolledBack;
            return Err(Error::TransactionClosed);
        }
        Ok(())
    }

    async fn receive<T>(&mut self, reply: oneshot::Receiver<Result<T>>) -> Result<T> {
        match reply.await {
            Ok(result) => result,
            Err(_) => {
                self.state = TransactionState::RolledBack;
                Err(Error::TransactionClosed)
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
