//! In-process keyspace implementing [`CommandExecutor`]
//!
//! Keys are raw byte strings enumerated in sorted order; the cursor is the decimal offset of
//! the next key and `0` ends the walk. `MATCH` is applied after the page is
//! cut, as Redis does, so filtered pages may come back short or empty.

use crate::error::{StoreError, StoreResult};
use crate::store::{CommandExecutor, StoreCommand, CURSOR_START};

use parking_lot::RwLock;
use redis::Value;
use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Key -> reported memory usage in bytes
    keys: RwLock<BTreeMap<Vec<u8>, u64>>,
    round_trips: AtomicU64,
    scans: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `keys` with their memory usage
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<Vec<u8>>,
    {
        let store = Self::new();
        {
            let mut map = store.keys.write();
            for (key, size) in keys {
                map.insert(key.into(), size);
            }
        }
        store
    }

    /// Insert or replace a key
    pub fn insert(&self, key: impl Into<Vec<u8>>, size: u64) {
        self.keys.write().insert(key.into(), size);
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// True when no keys are held
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Round trips served so far (a batch counts once)
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// SCAN commands served so far
    pub fn scan_calls(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    fn apply(&self, command: StoreCommand) -> StoreResult<Value> {
        match command {
            StoreCommand::Scan {
                cursor,
                count,
                pattern,
            } => {
                self.scans.fetch_add(1, Ordering::SeqCst);
                self.scan(&cursor, count, pattern.as_deref())
            }
            StoreCommand::MemoryUsage { key } => Ok(match self.keys.read().get(&key) {
                Some(size) => Value::Int(*size as i64),
                None => Value::Nil,
            }),
            StoreCommand::DbSize => Ok(Value::Int(self.len() as i64)),
            StoreCommand::Set { key, value, .. } => {
                let size = (key.len() + value.len()) as u64;
                self.insert(key, size);
                Ok(Value::Okay)
            }
        }
    }

    fn scan(&self, cursor: &str, count: usize, pattern: Option<&str>) -> StoreResult<Value> {
        let offset: usize = cursor
            .parse()
            .map_err(|_| StoreError::Protocol("ERR invalid cursor".into()))?;
        let matcher = pattern.map(glob_to_regex).transpose()?;

        let keys = self.keys.read();
        let end = offset.saturating_add(count.max(1)).min(keys.len());

        let page: Vec<Value> = keys
            .keys()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .filter(|k| matcher.as_ref().map_or(true, |re| re.is_match(k)))
            .map(|k| Value::BulkString(k.clone()))
            .collect();

        let next = if end >= keys.len() {
            CURSOR_START.to_string()
        } else {
            end.to_string()
        };

        Ok(Value::Array(vec![
            Value::BulkString(next.into_bytes()),
            Value::Array(page),
        ]))
    }
}

#[async_trait::async_trait]
impl CommandExecutor for MemoryStore {
    async fn execute(&self, command: StoreCommand) -> StoreResult<Value> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.apply(command)
    }

    async fn execute_batch(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<Value>> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        commands.into_iter().map(|c| self.apply(c)).collect()
    }
}

/// Translate a Redis glob (`*`, `?`, `[...]`, `\x`) into an anchored regex
///
/// Wildcards match any byte, so keys that are not UTF-8 can still match.
fn glob_to_regex(pattern: &str) -> StoreResult<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str("(?s-u:.)*"),
            '?' => re.push_str("(?s-u:.)"),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    re.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '[' => {
                re.push('[');
                for class_char in chars.by_ref() {
                    match class_char {
                        ']' => break,
                        '^' => re.push('^'),
                        '-' => re.push('-'),
                        other => re.push_str(&regex::escape(&other.to_string())),
                    }
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| StoreError::Protocol(format!("ERR invalid pattern: {}", e)))
}
