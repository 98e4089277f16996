//! MemoryStore: in-process backend with watch semantics
//!
//! Models a single-threaded key-value server:
//! - One `parking_lot::Mutex` around the keyspace stands in for the server's
//!   command loop, so every command (and every script) is atomic.
//! - Each key carries a modification revision, bumped by every write or
//!   delete. A watch remembers the revision it saw; a conditional execution
//!   fails if any watched revision moved.
//! - Revisions outlive deletes, so deleting a watched key also trips the
//!   watch.
//!
//! Plain [`MemoryStore::set`] / [`MemoryStore::del`] are non-transactional
//! writes from "another client". They bump revisions but never touch
//! version markers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tidkv_core::{StoreError, StoreResult};

use crate::script::{CommitScript, ScriptHost};
use crate::traits::{ExecOutcome, VersionedStore, WatchSession};

#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Vec<u8>>,
    /// Last revision that modified each key, kept after deletes
    revisions: HashMap<String, u64>,
    revision: u64,
}

impl Keyspace {
    fn touch(&mut self, key: &str) {
        self.revision += 1;
        self.revisions.insert(key.to_string(), self.revision);
    }

    fn revision_of(&self, key: &str) -> u64 {
        self.revisions.get(key).copied().unwrap_or(0)
    }

    fn mget(&self, keys: &[String]) -> Vec<Option<Vec<u8>>> {
        keys.iter().map(|k| self.data.get(k).cloned()).collect()
    }
}

impl ScriptHost for Keyspace {
    fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.data.insert(key.to_string(), value);
        self.touch(key);
    }

    fn del(&mut self, key: &str) {
        if self.data.remove(key).is_some() {
            self.touch(key);
        }
    }
}

/// Command counters, for asserting which calls reached the store
#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    watches: AtomicU64,
    execs: AtomicU64,
}

/// Snapshot of [`MemoryStore`] command counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// GET and MGET calls
    pub reads: u64,
    /// WATCH calls
    pub watches: u64,
    /// Conditional executions attempted
    pub execs: u64,
}

#[derive(Debug, Default)]
struct Shared {
    keyspace: Mutex<Keyspace>,
    closed: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// In-process store implementing [`VersionedStore`]
///
/// Clones share the same keyspace, like clients of one server.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-transactional write
    pub fn set(&self, key: &str, value: impl Into<Vec<u8>>) -> StoreResult<()> {
        self.shared.ensure_open()?;
        self.shared.keyspace.lock().set(key, value.into());
        Ok(())
    }

    /// Non-transactional delete
    pub fn del(&self, key: &str) -> StoreResult<()> {
        self.shared.ensure_open()?;
        self.shared.keyspace.lock().del(key);
        Ok(())
    }

    /// Copy of every key and value, sorted by key
    pub fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        let keyspace = self.shared.keyspace.lock();
        keyspace
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Command counters so far
    pub fn stats(&self) -> MemoryStats {
        let c = &self.shared.counters;
        MemoryStats {
            reads: c.reads.load(Ordering::Relaxed),
            watches: c.watches.load(Ordering::Relaxed),
            execs: c.execs.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    type Session = MemorySession;

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.shared.ensure_open()?;
        self.shared.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.shared.keyspace.lock().data.get(key).cloned())
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.shared.ensure_open()?;
        self.shared.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.shared.keyspace.lock().mget(keys))
    }

    async fn session(&self) -> StoreResult<MemorySession> {
        self.shared.ensure_open()?;
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
            watched: HashMap::new(),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("memory store closed");
        }
        Ok(())
    }
}

/// Session over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    shared: Arc<Shared>,
    /// Watched keys and the revision observed when each was watched
    watched: HashMap<String, u64>,
}

impl MemorySession {
    /// Keys currently watched by this session
    pub fn watched_keys(&self) -> impl Iterator<Item = &str> {
        self.watched.keys().map(String::as_str)
    }
}

#[async_trait]
impl WatchSession for MemorySession {
    async fn watch(&mut self, keys: &[String]) -> StoreResult<()> {
        self.shared.ensure_open()?;
        self.shared.counters.watches.fetch_add(1, Ordering::Relaxed);
        let keyspace = self.shared.keyspace.lock();
        for key in keys {
            // Re-watching keeps the first observed revision
            self.watched
                .entry(key.clone())
                .or_insert_with(|| keyspace.revision_of(key));
        }
        Ok(())
    }

    async fn mget(&mut self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.shared.ensure_open()?;
        self.shared.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.shared.keyspace.lock().mget(keys))
    }

    async fn exec_script(
        &mut self,
        script: &CommitScript,
        keys: &[String],
        args: &[Vec<u8>],
    ) -> StoreResult<ExecOutcome> {
        let watched = std::mem::take(&mut self.watched);
        self.shared.ensure_open()?;
        self.shared.counters.execs.fetch_add(1, Ordering::Relaxed);

        let mut keyspace = self.shared.keyspace.lock();
        let dirty = watched
            .iter()
            .find(|(key, seen)| keyspace.revision_of(key) != **seen);
        if let Some((key, _)) = dirty {
            tracing::trace!(key = %key, "watched key changed, discarding exec");
            return Ok(ExecOutcome::WatchFailed);
        }

        let tid = script.run(&mut *keyspace, keys, args)?;
        Ok(ExecOutcome::Applied(tid))
    }

    async fn unwatch(&mut self) -> StoreResult<()> {
        self.watched.clear();
        self.shared.ensure_open()
    }
}
