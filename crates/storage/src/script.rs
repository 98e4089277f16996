//! The atomic commit script
//!
//! One script invocation applies a whole transaction:
//!
//! ```text
//! 1. tid = INCR <marker key>
//! 2. for each staged key: SET key value | DEL key
//! 3. for each staged key: SET key<tid suffix> tid
//! 4. return tid
//! ```
//!
//! The store runs a script as one indivisible unit, so no other client
//! observes a commit half applied and `key:tid` changes iff `key` does.
//!
//! [`CommitScript`] carries both renditions of this one definition: Lua
//! source for servers ([`CommitScript::source`]) and a reference
//! interpreter for in-process backends ([`CommitScript::run`]).

use tidkv_core::{encode_tid, parse_tid, KeySpace, StagedWrite, StoreError, StoreResult, TombstoneEncoding};

/// Version of the script templates below
///
/// Bump when the argument layout changes.
pub const COMMIT_SCRIPT_VERSION: u32 = 2;

/// Op argument for a put under [`TombstoneEncoding::Tagged`]
pub const OP_SET: &[u8] = b"set";

/// Op argument for a delete under [`TombstoneEncoding::Tagged`]
pub const OP_DEL: &[u8] = b"del";

const TAGGED_TEMPLATE: &str = r#"-- tidkv commit script v{version} (tagged)
local tid = redis.call("INCR", {marker_key})
for i, key in ipairs(KEYS) do
    if ARGV[2 * i - 1] == "del" then
        redis.call("DEL", key)
    else
        redis.call("SET", key, ARGV[2 * i])
    end
    redis.call("SET", key .. {tid_suffix}, tid)
end
return tid
"#;

const EMPTY_VALUE_TEMPLATE: &str = r#"-- tidkv commit script v{version} (empty value)
local tid = redis.call("INCR", {marker_key})
for i, key in ipairs(KEYS) do
    if ARGV[i] == '' then
        redis.call("DEL", key)
    else
        redis.call("SET", key, ARGV[i])
    end
    redis.call("SET", key .. {tid_suffix}, tid)
end
return tid
"#;

/// Store commands a script needs
///
/// Implemented by in-process backends over their keyspace while they hold
/// whatever makes the script atomic.
pub trait ScriptHost {
    /// Read a key
    fn get(&self, key: &str) -> Option<&[u8]>;

    /// Write a key
    fn set(&mut self, key: &str, value: Vec<u8>);

    /// Remove a key
    fn del(&mut self, key: &str);
}

/// A rendered, immutable commit script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitScript {
    key_space: KeySpace,
    encoding: TombstoneEncoding,
    source: String,
}

impl CommitScript {
    /// Render the script for a key space and tombstone encoding
    pub fn new(key_space: KeySpace, encoding: TombstoneEncoding) -> Self {
        let template = match encoding {
            TombstoneEncoding::Tagged => TAGGED_TEMPLATE,
            TombstoneEncoding::EmptyValue => EMPTY_VALUE_TEMPLATE,
        };
        let source = template
            .replace("{version}", &COMMIT_SCRIPT_VERSION.to_string())
            .replace("{marker_key}", &lua_quote(key_space.marker_key()))
            .replace("{tid_suffix}", &lua_quote(key_space.tid_suffix()));
        Self {
            key_space,
            encoding,
            source,
        }
    }

    /// Lua source to send to a server
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Bookkeeping key names the script writes
    pub fn key_space(&self) -> &KeySpace {
        &self.key_space
    }

    /// Argument layout
    pub fn encoding(&self) -> TombstoneEncoding {
        self.encoding
    }

    /// Build the `KEYS` and `ARGV` lists for a set of staged writes
    pub fn encode<'a, I>(&self, writes: I) -> (Vec<String>, Vec<Vec<u8>>)
    where
        I: IntoIterator<Item = (&'a String, &'a StagedWrite)>,
    {
        let mut keys = Vec::new();
        let mut args = Vec::new();
        for (key, write) in writes {
            keys.push(key.clone());
            match (self.encoding, write) {
                (TombstoneEncoding::Tagged, StagedWrite::Put(value)) => {
                    args.push(OP_SET.to_vec());
                    args.push(value.clone());
                }
                (TombstoneEncoding::Tagged, StagedWrite::Delete) => {
                    args.push(OP_DEL.to_vec());
                    args.push(Vec::new());
                }
                (TombstoneEncoding::EmptyValue, StagedWrite::Put(value)) => {
                    args.push(value.clone());
                }
                (TombstoneEncoding::EmptyValue, StagedWrite::Delete) => {
                    args.push(Vec::new());
                }
            }
        }
        (keys, args)
    }

    /// Decode `KEYS` / `ARGV` back into writes
    ///
    /// # Errors
    ///
    /// Fails if the argument count does not match the layout or an op is
    /// unknown. Nothing has been applied at that point.
    pub fn decode(&self, keys: &[String], args: &[Vec<u8>]) -> StoreResult<Vec<(String, StagedWrite)>> {
        let per_key = match self.encoding {
            TombstoneEncoding::Tagged => 2,
            TombstoneEncoding::EmptyValue => 1,
        };
        if args.len() != keys.len() * per_key {
            return Err(StoreError::Script(format!(
                "expected {} arguments for {} keys, got {}",
                keys.len() * per_key,
                keys.len(),
                args.len()
            )));
        }

        keys.iter()
            .zip(args.chunks(per_key))
            .map(|(key, chunk)| {
                let write = match (self.encoding, chunk) {
                    (TombstoneEncoding::Tagged, [op, value]) => match op.as_slice() {
                        OP_SET => StagedWrite::Put(value.clone()),
                        OP_DEL => StagedWrite::Delete,
                        other => {
                            return Err(StoreError::Script(format!(
                                "unknown op {:?} for key {}",
                                String::from_utf8_lossy(other),
                                key
                            )))
                        }
                    },
                    (TombstoneEncoding::EmptyValue, [value]) if value.is_empty() => {
                        StagedWrite::Delete
                    }
                    (TombstoneEncoding::EmptyValue, [value]) => StagedWrite::Put(value.clone()),
                    _ => unreachable!("chunks are exactly per_key long"),
                };
                Ok((key.clone(), write))
            })
            .collect()
    }

    /// Execute the script against an in-process keyspace
    ///
    /// The caller provides atomicity (holds the keyspace lock for the whole
    /// call). Arguments are validated before anything is written.
    pub fn run<H: ScriptHost>(&self, host: &mut H, keys: &[String], args: &[Vec<u8>]) -> StoreResult<u64> {
        let writes = self.decode(keys, args)?;

        let marker_key = self.key_space.marker_key();
        let tid = parse_tid(marker_key, host.get(marker_key))
            .map_err(|e| StoreError::Script(e.to_string()))?
            .checked_add(1)
            .ok_or_else(|| StoreError::Script("tid counter overflow".to_string()))?;
        host.set(marker_key, encode_tid(tid));

        for (key, write) in writes {
            match write {
                StagedWrite::Put(value) => host.set(&key, value),
                StagedWrite::Delete => host.del(&key),
            }
            host.set(&self.key_space.tid_key(&key), encode_tid(tid));
        }

        Ok(tid)
    }
}

impl Default for CommitScript {
    fn default() -> Self {
        Self::new(KeySpace::default(), TombstoneEncoding::default())
    }
}

/// Quote a string as a Lua string literal
fn lua_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Default)]
    struct MapHost(HashMap<String, Vec<u8>>);

    impl ScriptHost for MapHost {
        fn get(&self, key: &str) -> Option<&[u8]> {
            self.0.get(key).map(Vec::as_slice)
        }
        fn set(&mut self, key: &str, value: Vec<u8>) {
            self.0.insert(key.to_string(), value);
        }
        fn del(&mut self, key: &str) {
            self.0.remove(key);
        }
    }

    fn writes(entries: &[(&str, Option<&[u8]>)]) -> BTreeMap<String, StagedWrite> {
        entries
            .iter()
            .map(|(k, v)| {
                let w = match v {
                    Some(v) => StagedWrite::Put(v.to_vec()),
                    None => StagedWrite::Delete,
                };
                (k.to_string(), w)
            })
            .collect()
    }

    #[test]
    fn test_source_uses_default_names() {
        let script = CommitScript::default();
        assert!(script.source().contains(r#"redis.call("INCR", "__txMarker")"#));
        assert!(script.source().contains(r#"key .. ":tid""#));
        assert!(script.source().contains("v2"));
    }

    #[test]
    fn test_source_quotes_custom_names() {
        let ks = KeySpace::new("tx\"m", "#v").unwrap();
        let script = CommitScript::new(ks, TombstoneEncoding::EmptyValue);
        assert!(script.source().contains(r#""tx\"m""#));
        assert!(script.source().contains("ARGV[i] == ''"));
    }

    #[test]
    fn test_tagged_layout() {
        let script = CommitScript::default();
        let staged = writes(&[("a", Some(b"1")), ("b", None), ("c", Some(b""))]);
        let (keys, args) = script.encode(&staged);

        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(
            args,
            vec![
                b"set".to_vec(),
                b"1".to_vec(),
                b"del".to_vec(),
                Vec::new(),
                b"set".to_vec(),
                Vec::new(),
            ]
        );
    }

    #[test]
    fn test_empty_value_layout_turns_empty_put_into_delete() {
        let script = CommitScript::new(KeySpace::default(), TombstoneEncoding::EmptyValue);
        let staged = writes(&[("a", Some(b"")), ("b", Some(b"x"))]);
        let (keys, args) = script.encode(&staged);

        let decoded = script.decode(&keys, &args).unwrap();
        assert_eq!(decoded[0], ("a".to_string(), StagedWrite::Delete));
        assert_eq!(decoded[1], ("b".to_string(), StagedWrite::Put(b"x".to_vec())));
    }

    #[test]
    fn test_run_applies_writes_and_stamps_tids() {
        let script = CommitScript::default();
        let mut host = MapHost::default();
        host.set("gone", b"old".to_vec());

        let staged = writes(&[("a", Some(b"1")), ("gone", None), ("empty", Some(b""))]);
        let (keys, args) = script.encode(&staged);
        let tid = script.run(&mut host, &keys, &args).unwrap();

        assert_eq!(tid, 1);
        assert_eq!(host.get("__txMarker"), Some(&b"1"[..]));
        assert_eq!(host.get("a"), Some(&b"1"[..]));
        assert_eq!(host.get("a:tid"), Some(&b"1"[..]));
        assert_eq!(host.get("gone"), None);
        assert_eq!(host.get("gone:tid"), Some(&b"1"[..]));
        assert_eq!(host.get("empty"), Some(&b""[..]));

        let tid = script.run(&mut host, &keys[..1], &args[..2]).unwrap();
        assert_eq!(tid, 2);
        assert_eq!(host.get("a:tid"), Some(&b"2"[..]));
        assert_eq!(host.get("empty:tid"), Some(&b"1"[..]));
    }

    #[test]
    fn test_run_rejects_bad_arguments_before_writing() {
        let script = CommitScript::default();
        let mut host = MapHost::default();

        let keys = vec!["a".to_string()];
        let err = script.run(&mut host, &keys, &[b"set".to_vec()]).unwrap_err();
        assert!(matches!(err, StoreError::Script(_)));

        let err = script
            .run(&mut host, &keys, &[b"upsert".to_vec(), b"v".to_vec()])
            .unwrap_err();
        assert!(err.to_string().contains("unknown op"));

        assert!(host.0.is_empty());
    }

    #[test]
    fn test_run_fails_on_corrupt_counter() {
        let script = CommitScript::default();
        let mut host = MapHost::default();
        host.set("__txMarker", b"not a number".to_vec());

        let keys = vec!["a".to_string()];
        let args = vec![b"set".to_vec(), b"v".to_vec()];
        assert!(matches!(
            script.run(&mut host, &keys, &args),
            Err(StoreError::Script(_))
        ));
        assert_eq!(host.get("a"), None);
    }
}
