//! Database: the entry point for transactions
//!
//! A `Database` wraps a [`VersionedStore`] and the commit script rendered
//! from its [`DatabaseConfig`]. It is cheap to clone; clones share the store.
//!
//! # Transaction styles
//!
//! - **Manual**: `begin()` returns a [`Transaction`] the caller commits or
//!   rolls back. Dropping it rolls back.
//! - **Closure**: `view()`, `update()` and `update_with_retry()` run a
//!   closure inside a transaction and finish it on every exit path.
//!
//! # Example
//!
//! ```ignore
//! let db = Database::new(MemoryStore::new());
//! db.update(|txn| Box::pin(async move {
//!     txn.set("a", "1")?;
//!     txn.set("b", "2")?;
//!     Ok(())
//! }))
//! .await?;
//! ```

mod config;
mod transactions;

pub use config::{DatabaseConfig, CONFIG_FILE_NAME};
pub use transactions::RetryConfig;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info};

use tidkv_concurrency::{Transaction, TransactionOptions};
use tidkv_core::{parse_tid, Result};
use tidkv_storage::{CommitScript, VersionedStore};

/// Handle to a transactional key-value database
pub struct Database<S: VersionedStore> {
    store: Arc<S>,
    script: Arc<CommitScript>,
    config: DatabaseConfig,
}

impl<S: VersionedStore> Clone for Database<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            script: Arc::clone(&self.script),
            config: self.config.clone(),
        }
    }
}

impl<S: VersionedStore> std::fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: VersionedStore> Database<S> {
    /// Wrap a store with the default configuration
    pub fn new(store: S) -> Self {
        Self::open(store, DatabaseConfig::default(), CommitScript::default())
    }

    /// Wrap a store with a custom configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn with_config(store: S, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let script = config.commit_script()?;
        Ok(Self::open(store, config, script))
    }

    fn open(store: S, config: DatabaseConfig, script: CommitScript) -> Self {
        info!(
            marker_key = %config.marker_key,
            tid_suffix = %config.tid_suffix,
            tombstones = ?config.tombstones,
            timeout_ms = ?config.tx_timeout_ms,
            "database opened"
        );
        Self {
            store: Arc::new(store),
            script: Arc::new(script),
            config,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Commit script sent to the store
    pub fn commit_script(&self) -> &CommitScript {
        &self.script
    }

    /// Latest committed tid (0 before the first commit)
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the counter cannot be read or parsed.
    pub async fn current_tid(&self) -> Result<u64> {
        let marker_key = self.script.key_space().marker_key();
        let raw = self.store.get(marker_key).await?;
        Ok(parse_tid(marker_key, raw.as_deref())?)
    }

    // ========================================================================
    // Manual Transactions
    // ========================================================================

    /// Begin a transaction
    ///
    /// The snapshot is the current global tid. The configured timeout, if
    /// any, applies.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the counter cannot be read or a session
    /// cannot be opened (including after `close`).
    pub async fn begin(&self, writable: bool) -> Result<Transaction> {
        let deadline = self.config.tx_timeout().and_then(deadline_after);
        self.start(writable, deadline).await
    }

    /// Begin a transaction that rolls back after `timeout`
    ///
    /// A timeout too large to represent means no deadline.
    pub async fn begin_with_timeout(&self, writable: bool, timeout: Duration) -> Result<Transaction> {
        self.start(writable, deadline_after(timeout)).await
    }

    async fn start(&self, writable: bool, deadline: Option<Instant>) -> Result<Transaction> {
        let marker_tid = self.current_tid().await?;
        let session = self.store.session().await?;
        Ok(Transaction::start(
            session,
            Arc::clone(&self.script),
            TransactionOptions {
                writable,
                marker_tid,
                deadline,
            },
        ))
    }

    // ========================================================================
    // Closure Transactions
    // ========================================================================

    /// Run `f` in a read-only transaction
    ///
    /// An error from `f` is returned as is. On success the (empty) commit
    /// runs and the transaction is then rolled back; nothing is ever
    /// written.
    ///
    /// # Example
    /// ```ignore
    /// let value = db.view(|txn| Box::pin(async move { txn.get("k").await })).await?;
    /// ```
    pub async fn view<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let mut txn = self.begin(false).await?;
        let value = f(&mut txn).await?;
        txn.commit().await?;
        txn.rollback()?;
        Ok(value)
    }

    /// Run `f` in a writable transaction and commit its writes
    ///
    /// If `f` fails nothing is committed and its error is returned.
    /// Dropping the returned future before it completes rolls back.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` if the commit lost against another transaction;
    /// the caller may run the whole update again.
    pub async fn update<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let mut txn = self.begin(true).await?;
        let value = f(&mut txn).await?;
        let tid = txn.commit().await?;
        debug!(tid = ?tid, "update committed");
        Ok(value)
    }

    /// Run `update` again from scratch while it fails with a conflict
    ///
    /// The closure is called repeatedly until either:
    /// - The transaction commits successfully
    /// - A non-conflict error occurs (not retried)
    /// - Maximum retries are exceeded (the last conflict is returned)
    ///
    /// # Example
    /// ```ignore
    /// db.update_with_retry(db.config().retry.clone(), |txn| Box::pin(async move {
    ///     let n = txn.get("n").await?.map_or(0, |v| v[0]);
    ///     txn.set("n", vec![n + 1])
    /// }))
    /// .await?;
    /// ```
    pub async fn update_with_retry<F, T>(&self, config: RetryConfig, f: F) -> Result<T>
    where
        F: for<'t> Fn(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.update(&f).await {
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    let delay = config.backoff(attempt);
                    debug!(attempt, ?delay, error = %e, "retrying update");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Release the store connection
    ///
    /// Transactions still running fail on their next store access; later
    /// `begin` calls fail with `Error::Store`.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        info!("database closed");
        Ok(())
    }
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
