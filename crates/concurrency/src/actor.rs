//! Transaction actor
//!
//! Every transaction gets one tokio task that owns its store session. The
//! session's watch state is single-owner, so all store I/O for the
//! transaction runs here, one command at a time.
//!
//! ## States
//!
//! ```text
//! Running --commit ok-----> Committed
//!         --commit failed-> CommitFailed
//!         --rollback------> RolledBack
//!         --deadline------> TimedOut
//!         --handle dropped> Abandoned
//! ```
//!
//! Every exit is terminal. Teardown signals are also checked while a read
//! is in flight; the session is then abandoned, since its connection may be
//! stuck. A commit, once issued, runs to completion so its reply always
//! matches what the store did. Otherwise watches are released on the way
//! out.

use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use tracing::{debug, trace};

use tidkv_core::{parse_tid, Conflict, KeySpace, Result, StagedWrite, StoreError};
use tidkv_storage::{CommitScript, WatchSession};

use crate::protocol;

/// Upper bound on the best-effort UNWATCH at exit
const RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Messages from a [`Transaction`](crate::Transaction) handle to its actor
#[derive(Debug)]
pub(crate) enum Command {
    /// Conflict-aware read of one key
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<Vec<u8>>>>,
    },
    /// Apply staged writes and finish
    Commit {
        writes: BTreeMap<String, StagedWrite>,
        reply: oneshot::Sender<Result<Option<u64>>>,
    },
}

/// How an actor loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActorExit {
    /// The commit script ran
    Committed,
    /// Commit was attempted and failed
    CommitFailed,
    /// Rollback was requested
    RolledBack,
    /// The transaction deadline passed
    TimedOut,
    /// The handle was dropped without commit or rollback
    Abandoned,
}

/// Rollback and deadline signals
pub(crate) struct Teardown {
    cancel: oneshot::Receiver<()>,
    expiry: Option<Pin<Box<Sleep>>>,
}

impl Teardown {
    pub(crate) fn new(cancel: oneshot::Receiver<()>, deadline: Option<Instant>) -> Self {
        Self {
            cancel,
            expiry: deadline.map(|d| Box::pin(tokio::time::sleep_until(d))),
        }
    }

    /// Resolves once the transaction must stop
    async fn signalled(&mut self) -> ActorExit {
        let Teardown { cancel, expiry } = self;
        let expired = async move {
            match expiry {
                Some(sleep) => sleep.as_mut().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            requested = cancel => match requested {
                Ok(()) => ActorExit::RolledBack,
                Err(_) => ActorExit::Abandoned,
            },
            _ = expired => ActorExit::TimedOut,
        }
    }
}

/// Per-transaction state owned by the actor task
pub(crate) struct TransactionActor<W> {
    session: W,
    script: Arc<CommitScript>,
    marker_tid: u64,
    /// Keys watched so far; each is watched once
    watched: HashSet<String>,
}

impl<W: WatchSession> TransactionActor<W> {
    pub(crate) fn new(session: W, script: Arc<CommitScript>, marker_tid: u64) -> Self {
        Self {
            session,
            script,
            marker_tid,
            watched: HashSet::new(),
        }
    }

    fn key_space(&self) -> &KeySpace {
        self.script.key_space()
    }

    /// Serve commands until commit, rollback, deadline or handle drop
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut teardown: Teardown,
    ) -> ActorExit {
        let mut interrupted = false;
        let exit = loop {
            let command = tokio::select! {
                biased;
                exit = teardown.signalled() => break exit,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break ActorExit::Abandoned,
                },
            };

            match command {
                Command::Get { key, reply } => {
                    let result = tokio::select! {
                        biased;
                        exit = teardown.signalled() => {
                            interrupted = true;
                            break exit;
                        }
                        result = self.read(&key) => result,
                    };
                    let _ = reply.send(result);
                }
                Command::Commit { writes, reply } => {
                    let result = protocol::commit(&mut self.session, &self.script, &writes).await;
                    // The store drops watches on exec; empty commits keep theirs
                    if !writes.is_empty() {
                        self.watched.clear();
                    }
                    let exit = match &result {
                        Ok(tid) => {
                            debug!(marker_tid = self.marker_tid, tid = ?tid, writes = writes.len(), "transaction committed");
                            ActorExit::Committed
                        }
                        Err(e) => {
                            debug!(marker_tid = self.marker_tid, error = %e, "commit failed");
                            ActorExit::CommitFailed
                        }
                    };
                    let _ = reply.send(result);
                    break exit;
                }
            }
        };

        if interrupted {
            debug!(marker_tid = self.marker_tid, exit = ?exit, "read interrupted, abandoning session");
        } else {
            self.release().await;
        }
        trace!(marker_tid = self.marker_tid, exit = ?exit, "transaction actor exited");
        exit
    }

    /// Conflict-aware read
    ///
    /// 1. Watch the key (first read only)
    /// 2. MGET the key and its version marker
    /// 3. Version marker newer than the snapshot => stale read
    async fn read(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if !self.watched.contains(key) {
            self.session.watch(&[key.to_string()]).await?;
            self.watched.insert(key.to_string());
        }

        let tid_key = self.key_space().tid_key(key);
        let mut values = self
            .session
            .mget(&[key.to_string(), tid_key.clone()])
            .await?;
        if values.len() != 2 {
            return Err(StoreError::Protocol(format!(
                "MGET of 2 keys returned {} values",
                values.len()
            ))
            .into());
        }
        let raw_tid = values.pop().flatten();
        let value = values.pop().flatten();

        let tid = parse_tid(&tid_key, raw_tid.as_deref())?;
        if tid > self.marker_tid {
            trace!(key, tid, marker_tid = self.marker_tid, "stale read");
            return Err(Conflict::StaleRead {
                key: key.to_string(),
                tid,
                marker_tid: self.marker_tid,
                value,
            }
            .into());
        }

        Ok(value)
    }

    /// Drop remaining watches, best effort and bounded by `RELEASE_TIMEOUT`
    async fn release(&mut self) {
        if self.watched.is_empty() {
            return;
        }
        match tokio::time::timeout(RELEASE_TIMEOUT, self.session.unwatch()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "failed to release watches"),
            Err(_) => debug!("timed out releasing watches"),
        }
        self.watched.clear();
    }
}
