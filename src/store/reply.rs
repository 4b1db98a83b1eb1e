//! Reply decoding
//!
//! Replies arrive as raw [`redis::Value`]s from any executor. Anything that
//! does not have the shape its command promises is a
//! [`StoreError::MalformedReply`].

use crate::error::{StoreError, StoreResult};
use redis::Value;

/// Cursor that starts an enumeration and marks its end
pub const CURSOR_START: &str = "0";

/// One page of a SCAN enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next round trip
    pub cursor: String,
    /// Raw key names in scan order
    pub keys: Vec<Vec<u8>>,
}

impl ScanPage {
    /// Decode a `[cursor, [key, ...]]` reply
    pub fn from_reply(value: Value) -> StoreResult<Self> {
        let parts = match value {
            Value::Array(parts) => parts,
            other => {
                return Err(StoreError::malformed(
                    "SCAN",
                    format!("expected array, got {:?}", other),
                ))
            }
        };

        if parts.len() != 2 {
            return Err(StoreError::malformed(
                "SCAN",
                format!("expected 2 elements, got {}", parts.len()),
            ));
        }

        let mut parts = parts.into_iter();
        let cursor = parts
            .next()
            .map(|v| string_value("SCAN", v))
            .transpose()?
            .unwrap_or_default();

        let keys = match parts.next() {
            Some(Value::Array(keys)) => keys
                .into_iter()
                .map(|k| bytes_value("SCAN", k))
                .collect::<StoreResult<Vec<_>>>()?,
            other => {
                return Err(StoreError::malformed(
                    "SCAN",
                    format!("expected key array, got {:?}", other),
                ))
            }
        };

        Ok(Self { cursor, keys })
    }

    /// True when the server returned the end-of-enumeration cursor
    pub fn is_last(&self) -> bool {
        self.cursor == CURSOR_START
    }
}

/// Decode an integer reply; nil decodes to `None`
pub fn int_reply(command: &str, value: Value) -> StoreResult<Option<i64>> {
    match value {
        Value::Int(n) => Ok(Some(n)),
        Value::Nil => Ok(None),
        other => Err(StoreError::malformed(
            command,
            format!("expected integer, got {:?}", other),
        )),
    }
}

/// Decode a MEMORY USAGE reply
///
/// A key that expired between SCAN and the lookup replies nil, which
/// decodes to `None`.
pub fn memory_usage_reply(value: Value) -> StoreResult<Option<u64>> {
    match int_reply("MEMORY USAGE", value)? {
        Some(n) if n >= 0 => Ok(Some(n as u64)),
        Some(n) => Err(StoreError::malformed(
            "MEMORY USAGE",
            format!("negative size {}", n),
        )),
        None => Ok(None),
    }
}

fn bytes_value(command: &str, value: Value) -> StoreResult<Vec<u8>> {
    match value {
        Value::BulkString(bytes) => Ok(bytes),
        Value::SimpleString(s) => Ok(s.into_bytes()),
        other => Err(StoreError::malformed(
            command,
            format!("expected string, got {:?}", other),
        )),
    }
}

fn string_value(command: &str, value: Value) -> StoreResult<String> {
    match value {
        Value::BulkString(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(s) => Ok(s),
        other => Err(StoreError::malformed(
            command,
            format!("expected string, got {:?}", other),
        )),
    }
}
