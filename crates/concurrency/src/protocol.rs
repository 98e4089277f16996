//! Atomic commit protocol
//!
//! ```text
//! 1. Nothing staged: succeed without touching the store
//! 2. Encode staged writes as KEYS / ARGV for the commit script
//! 3. Run the script inside the session's conditional execution
//! 4. Applied(tid)  => committed at tid
//!    WatchFailed   => a watched key changed, report a conflict
//! ```
//!
//! The script is all-or-nothing, so a failed commit leaves the store
//! untouched.

use std::collections::BTreeMap;

use tidkv_core::{Conflict, Result, StagedWrite};
use tidkv_storage::{CommitScript, ExecOutcome, WatchSession};

/// Apply staged writes through the commit script
///
/// # Returns
/// - `Ok(Some(tid))` - the writes are visible at `tid`
/// - `Ok(None)` - nothing was staged
///
/// # Errors
/// - `Error::Conflict(Conflict::WatchAborted)` if a watched key changed
/// - `Error::Store` on any store failure
pub(crate) async fn commit<W: WatchSession>(
    session: &mut W,
    script: &CommitScript,
    writes: &BTreeMap<String, StagedWrite>,
) -> Result<Option<u64>> {
    if writes.is_empty() {
        return Ok(None);
    }

    let (keys, args) = script.encode(writes);
    match session.exec_script(script, &keys, &args).await? {
        ExecOutcome::Applied(tid) => Ok(Some(tid)),
        ExecOutcome::WatchFailed => Err(Conflict::WatchAborted.into()),
    }
}
