//! Key naming for transaction bookkeeping
//!
//! Two kinds of bookkeeping keys live next to user data in the store:
//! - the global counter (`__txMarker` by default), incremented once per commit
//! - one version marker per data key, `<key>:tid` by default
//!
//! ## Contract
//!
//! The default names are FROZEN: stores written by other clients use them.
//! User keys may not address bookkeeping keys:
//! - a key must not equal the marker key
//! - a key must not end with the tid suffix
//!
//! Otherwise a write to `x:tid` would clobber the version marker of `x`.

use crate::error::{StoreError, StoreResult};
use thiserror::Error;

/// Default key of the global tid counter
pub const DEFAULT_MARKER_KEY: &str = "__txMarker";

/// Default suffix appended to a data key to name its version marker
pub const DEFAULT_TID_SUFFIX: &str = ":tid";

/// Key validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key addresses the global counter
    #[error("key {0:?} is the transaction marker key")]
    MarkerKey(String),

    /// Key addresses a version marker
    #[error("key {key:?} ends with the reserved suffix {suffix:?}")]
    ReservedSuffix {
        /// Offending key
        key: String,
        /// Reserved suffix
        suffix: String,
    },

    /// A bookkeeping name was empty
    #[error("{0} must not be empty")]
    EmptyName(&'static str),
}

/// Names of the bookkeeping keys
///
/// Cheap to clone and immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    marker_key: String,
    tid_suffix: String,
}

impl KeySpace {
    /// Build a key space with custom bookkeeping names
    ///
    /// # Errors
    ///
    /// Returns an error if either name is empty, or if the marker key itself
    /// ends with the suffix.
    pub fn new(marker_key: impl Into<String>, tid_suffix: impl Into<String>) -> Result<Self, KeyError> {
        let marker_key = marker_key.into();
        let tid_suffix = tid_suffix.into();
        if marker_key.is_empty() {
            return Err(KeyError::EmptyName("marker key"));
        }
        if tid_suffix.is_empty() {
            return Err(KeyError::EmptyName("tid suffix"));
        }
        if marker_key.ends_with(&tid_suffix) {
            return Err(KeyError::ReservedSuffix {
                key: marker_key,
                suffix: tid_suffix,
            });
        }
        Ok(Self {
            marker_key,
            tid_suffix,
        })
    }

    /// Key of the global counter
    pub fn marker_key(&self) -> &str {
        &self.marker_key
    }

    /// Suffix naming version markers
    pub fn tid_suffix(&self) -> &str {
        &self.tid_suffix
    }

    /// Version marker key for a data key
    pub fn tid_key(&self, key: &str) -> String {
        let mut tid_key = String::with_capacity(key.len() + self.tid_suffix.len());
        tid_key.push_str(key);
        tid_key.push_str(&self.tid_suffix);
        tid_key
    }

    /// Check that a user key does not address bookkeeping state
    pub fn validate(&self, key: &str) -> Result<(), KeyError> {
        if key == self.marker_key {
            return Err(KeyError::MarkerKey(key.to_string()));
        }
        if key.ends_with(&self.tid_suffix) {
            return Err(KeyError::ReservedSuffix {
                key: key.to_string(),
                suffix: self.tid_suffix.clone(),
            });
        }
        Ok(())
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            marker_key: DEFAULT_MARKER_KEY.to_string(),
            tid_suffix: DEFAULT_TID_SUFFIX.to_string(),
        }
    }
}

/// Parse a stored tid
///
/// Counters are stored as decimal ASCII (the store's native integer
/// encoding). An absent key means tid 0.
///
/// # Errors
///
/// Returns [`StoreError::InvalidTid`] if the bytes are not a decimal `u64`.
pub fn parse_tid(key: &str, raw: Option<&[u8]>) -> StoreResult<u64> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::InvalidTid {
            key: key.to_string(),
            raw: String::from_utf8_lossy(raw).into_owned(),
        })
}

/// Encode a tid the way the store's counter commands do
pub fn encode_tid(tid: u64) -> Vec<u8> {
    tid.to_string().into_bytes()
}
