//! Buffered writes and their tombstone encoding

use serde::{Deserialize, Serialize};

/// A write staged by a transaction, applied only at commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StagedWrite {
    /// Set the key to this value
    Put(Vec<u8>),
    /// Remove the key
    Delete,
}

impl StagedWrite {
    /// The value a read inside the same transaction observes
    pub fn visible_value(&self) -> Option<&[u8]> {
        match self {
            StagedWrite::Put(value) => Some(value),
            StagedWrite::Delete => None,
        }
    }

    /// Whether this write removes the key
    pub fn is_delete(&self) -> bool {
        matches!(self, StagedWrite::Delete)
    }
}

/// How deletes travel to the commit script
///
/// `Tagged` sends an explicit op per key, so an empty value is a value.
/// `EmptyValue` is the legacy layout where an empty argument means delete;
/// it exists for stores shared with clients that only speak that layout,
/// and turns a staged empty value into a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstoneEncoding {
    /// `ARGV` holds `op, value` pairs
    #[default]
    Tagged,
    /// `ARGV` holds one value per key, empty meaning delete
    EmptyValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_value() {
        assert_eq!(StagedWrite::Put(b"v".to_vec()).visible_value(), Some(&b"v"[..]));
        assert_eq!(StagedWrite::Put(Vec::new()).visible_value(), Some(&b""[..]));
        assert_eq!(StagedWrite::Delete.visible_value(), None);
        assert!(StagedWrite::Delete.is_delete());
    }
}
