//! Snapshot Export and Import
//!
//! A snapshot is the store's data map and expiry map. It is turned into an
//! opaque blob with the wire codec itself:
//!
//! ```text
//! *3
//!   $15 LITEKV-SNAPSHOT        magic
//!   :1                         format version
//!   *N                         entries, sorted by key
//!     *3
//!       $<key>
//!       :<int> | $<bytes> | *<list of $bytes>
//!       :<unix millis> | $-1   expiry
//! ```

use crate::protocol::{self, DecodeError, Value};
use crate::storage::expiry::{from_unix_millis, unix_millis};
use crate::storage::StoredValue;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;
use thiserror::Error;

const MAGIC: &[u8] = b"LITEKV-SNAPSHOT";
const VERSION: i64 = 1;

/// A full copy of the store's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub data: HashMap<Bytes, StoredValue>,
    pub expiry: HashMap<Bytes, SystemTime>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot is not valid wire data: {0}")]
    Decode(#[from] DecodeError),

    #[error("not a snapshot (bad magic)")]
    BadMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(i64),

    #[error("malformed snapshot: {0}")]
    Malformed(&'static str),
}

/// Serializes a snapshot into a blob.
pub fn export(snapshot: &Snapshot) -> Bytes {
    let mut keys: Vec<&Bytes> = snapshot.data.keys().collect();
    keys.sort();

    let entries = keys
        .into_iter()
        .map(|key| {
            let value = &snapshot.data[key];
            let expiry = snapshot
                .expiry
                .get(key)
                .map(|at| Value::Integer(unix_millis(*at)))
                .unwrap_or(Value::Nil);
            Value::array(vec![Value::BulkString(key.clone()), value.to_value(), expiry])
        })
        .collect();

    protocol::encode(&Value::array(vec![
        Value::bulk_string(MAGIC),
        Value::Integer(VERSION),
        Value::Array(entries),
    ]))
}

/// Rebuilds a snapshot from a blob produced by [`export`].
pub fn import(blob: &[u8]) -> Result<Snapshot, SnapshotError> {
    let Value::Array(parts) = protocol::decode(blob)? else {
        return Err(SnapshotError::Malformed("top level is not an array"));
    };
    let [magic, version, entries] = <[Value; 3]>::try_from(parts)
        .map_err(|_| SnapshotError::Malformed("header must have three parts"))?;

    if magic.as_bytes() != Some(MAGIC) {
        return Err(SnapshotError::BadMagic);
    }
    match version {
        Value::Integer(VERSION) => {}
        Value::Integer(other) => return Err(SnapshotError::UnsupportedVersion(other)),
        _ => return Err(SnapshotError::Malformed("version is not an integer")),
    }
    let Value::Array(entries) = entries else {
        return Err(SnapshotError::Malformed("entries is not an array"));
    };

    let mut snapshot = Snapshot::default();
    for entry in entries {
        let Value::Array(fields) = entry else {
            return Err(SnapshotError::Malformed("entry is not an array"));
        };
        let [key, value, expiry] = <[Value; 3]>::try_from(fields)
            .map_err(|_| SnapshotError::Malformed("entry must have three fields"))?;

        let Value::BulkString(key) = key else {
            return Err(SnapshotError::Malformed("key is not a bulk string"));
        };
        let value = stored_value(value)?;
        match expiry {
            Value::Nil => {}
            Value::Integer(ms) => {
                snapshot.expiry.insert(key.clone(), from_unix_millis(ms));
            }
            _ => return Err(SnapshotError::Malformed("expiry is not an integer or nil")),
        }
        snapshot.data.insert(key, value);
    }

    Ok(snapshot)
}

fn stored_value(value: Value) -> Result<StoredValue, SnapshotError> {
    match value {
        Value::Integer(n) => Ok(StoredValue::Integer(n)),
        Value::BulkString(b) => Ok(StoredValue::Bytes(b)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::BulkString(b) => Ok(b),
                _ => Err(SnapshotError::Malformed("list item is not a bulk string")),
            })
            .collect::<Result<VecDeque<_>, _>>()
            .map(StoredValue::List),
        _ => Err(SnapshotError::Malformed("unsupported value type")),
    }
}
