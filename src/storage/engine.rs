//! Key-Value Store with Lazy Expiry
//!
//! The store is a plain owned structure: a data map from key to
//! [`StoredValue`] plus a parallel expiry map from key to absolute instant.
//! It does no locking of its own; the server serializes every request
//! through one lock around the command processor, so all methods take
//! `&self` or `&mut self` directly.
//!
//! ## Expiry
//!
//! Expiry is lazy. There is no background sweep. Only [`Store::get`]
//! compares a key's instant against the clock, and when the key has expired
//! it removes both the data and the expiry entry before reporting the key as
//! missing.
//!
//! `exists`, `incr`, `decr`, `lpush` and `rpush` do not look at the expiry
//! map. A key that has passed its instant but has not been read yet still
//! exists for them, and a counter or list kept alive this way still carries
//! its old expiry instant.

use crate::protocol::Value;
use crate::storage::expiry::SetExpiry;
use crate::storage::snapshot::Snapshot;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;
use thiserror::Error;

/// What the store holds for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Integer(i64),
    /// Opaque bytes, read as decimal text by the counter operations.
    Bytes(Bytes),
    List(VecDeque<Bytes>),
}

impl StoredValue {
    /// The reply form of the value.
    pub fn to_value(&self) -> Value {
        match self {
            StoredValue::Integer(n) => Value::Integer(*n),
            StoredValue::Bytes(b) => Value::BulkString(b.clone()),
            StoredValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::BulkString).collect())
            }
        }
    }
}

/// Errors from store operations. The display text is the client reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR invalid expire time in 'SET' command")]
    InvalidExpireTime,

    #[error("ERR syntax error")]
    Syntax,
}

/// Operation counters reported by `INFO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub expires: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}

/// The in-memory key-value store.
///
/// # Example
///
/// ```
/// use litekv::storage::{Store, StoredValue};
/// use bytes::Bytes;
///
/// let mut store = Store::new();
/// store.set(Bytes::from("name"), StoredValue::Bytes(Bytes::from("Ariz")), None);
/// assert_eq!(
///     store.get(b"name"),
///     Some(&StoredValue::Bytes(Bytes::from("Ariz")))
/// );
/// assert_eq!(store.incr(&Bytes::from("hits")), Ok(1));
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<Bytes, StoredValue>,
    expiry: HashMap<Bytes, SystemTime>,
    stats: StorageStats,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites `key`, replacing its type, value and expiry.
    pub fn set(&mut self, key: Bytes, value: StoredValue, expires_at: Option<SystemTime>) {
        self.stats.set_ops += 1;

        match expires_at {
            Some(at) => {
                self.expiry.insert(key.clone(), at);
            }
            None => {
                self.expiry.remove(&key);
            }
        }
        self.data.insert(key, value);
    }

    /// Overwrites `key`, reading its expiry from `SET` modifier tokens.
    ///
    /// Nothing is written if the modifiers are invalid.
    pub fn set_with_options(
        &mut self,
        key: Bytes,
        value: StoredValue,
        options: &[Bytes],
    ) -> Result<(), StoreError> {
        let expiry = SetExpiry::parse(options, SystemTime::now())?;
        self.set(key, value, expiry.resolve());
        Ok(())
    }

    /// Returns the value for `key`, removing it first if it has expired.
    pub fn get(&mut self, key: &[u8]) -> Option<&StoredValue> {
        self.get_at(key, SystemTime::now())
    }

    fn get_at(&mut self, key: &[u8], now: SystemTime) -> Option<&StoredValue> {
        self.stats.get_ops += 1;

        if self.is_expired_at(key, now) {
            self.data.remove(key);
            self.expiry.remove(key);
            self.stats.expired += 1;
            return None;
        }
        self.data.get(key)
    }

    fn is_expired_at(&self, key: &[u8], now: SystemTime) -> bool {
        self.expiry.get(key).is_some_and(|at| now >= *at)
    }

    /// Whether `key` is present. Expiry is not evaluated here.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    /// Removes each key and its expiry, returning how many were present.
    pub fn del(&mut self, keys: &[Bytes]) -> usize {
        self.stats.del_ops += 1;

        let mut deleted = 0;
        for key in keys {
            if self.data.remove(key).is_some() {
                deleted += 1;
            }
            self.expiry.remove(key);
        }
        deleted
    }

    /// Adds one to the integer at `key`, treating a missing key as 0.
    pub fn incr(&mut self, key: &Bytes) -> Result<i64, StoreError> {
        self.incr_by(key, 1)
    }

    /// Subtracts one from the integer at `key`, treating a missing key as 0.
    pub fn decr(&mut self, key: &Bytes) -> Result<i64, StoreError> {
        self.incr_by(key, -1)
    }

    fn incr_by(&mut self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        let current = match self.data.get(key) {
            None => 0,
            Some(StoredValue::Integer(n)) => *n,
            Some(StoredValue::Bytes(text)) => std::str::from_utf8(text)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StoreError::NotAnInteger)?,
            Some(StoredValue::List(_)) => return Err(StoreError::WrongType),
        };

        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        self.data.insert(key.clone(), StoredValue::Integer(next));
        Ok(next)
    }

    /// Pushes each value onto the head of the list at `key` in turn.
    ///
    /// `LPUSH k a b c` leaves the list as `c, b, a`. Returns the new length.
    pub fn lpush(&mut self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StoreError> {
        let list = self.list_mut(key)?;
        for value in values {
            list.push_front(value);
        }
        Ok(list.len())
    }

    /// Appends the values to the tail of the list at `key`.
    pub fn rpush(&mut self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StoreError> {
        let list = self.list_mut(key)?;
        list.extend(values);
        Ok(list.len())
    }

    fn list_mut(&mut self, key: Bytes) -> Result<&mut VecDeque<Bytes>, StoreError> {
        let entry = self
            .data
            .entry(key)
            .or_insert_with(|| StoredValue::List(VecDeque::new()));
        match entry {
            StoredValue::List(list) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    /// Copies the data and expiry maps.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: self.data.clone(),
            expiry: self.expiry.clone(),
        }
    }

    /// Replaces all state with `snapshot`.
    ///
    /// Expiry entries for keys without data are dropped.
    pub fn restore(&mut self, snapshot: Snapshot) {
        let Snapshot { data, mut expiry } = snapshot;
        expiry.retain(|key, _| data.contains_key(key));
        self.data = data;
        self.expiry = expiry;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.data.len() as u64,
            expires: self.expiry.len() as u64,
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::expiry::{from_unix_millis, unix_millis};
    use std::time::Duration;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn text(s: &str) -> StoredValue {
        StoredValue::Bytes(key(s))
    }

    fn opts(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| key(p)).collect()
    }

    #[test]
    fn test_set_and_get() {
        let mut store = Store::new();
        store.set(key("name"), text("Ariz"), None);
        assert_eq!(store.get(b"name"), Some(&text("Ariz")));
        assert_eq!(store.get(b"missing"), None);
    }

    #[test]
    fn test_set_replaces_type_and_expiry() {
        let mut store = Store::new();
        store.rpush(key("k"), vec![key("a")]).unwrap();
        store
            .set_with_options(key("k"), text("v"), &opts(&["EX", "100"]))
            .unwrap();
        assert_eq!(store.stats().expires, 1);

        store.set(key("k"), StoredValue::Integer(3), None);
        assert_eq!(store.get(b"k"), Some(&StoredValue::Integer(3)));
        assert_eq!(store.stats().expires, 0);
    }

    #[test]
    fn test_invalid_options_write_nothing() {
        let mut store = Store::new();
        let result = store.set_with_options(key("k"), text("v"), &opts(&["EX"]));
        assert_eq!(result, Err(StoreError::Syntax));
        assert!(!store.exists(b"k"));
    }

    #[test]
    fn test_zero_expiry_removes_on_get() {
        let mut store = Store::new();
        store
            .set_with_options(key("k"), text("v"), &opts(&["EX", "0"]))
            .unwrap();

        // Not read yet, so still present.
        assert!(store.exists(b"k"));

        assert_eq!(store.get(b"k"), None);
        assert!(!store.exists(b"k"));
        assert_eq!(store.stats().expires, 0);
        assert_eq!(store.stats().expired, 1);
    }

    #[test]
    fn test_past_exat_removes_on_get() {
        let mut store = Store::new();
        store
            .set_with_options(key("k"), text("v"), &opts(&["EXAT", "1"]))
            .unwrap();
        assert_eq!(store.get(b"k"), None);
        assert!(!store.exists(b"k"));
    }

    #[test]
    fn test_get_before_and_after_expiry() {
        let mut store = Store::new();
        let now = from_unix_millis(unix_millis(SystemTime::now()));
        store.set(key("k"), text("v"), Some(now + Duration::from_secs(60)));

        assert_eq!(store.get_at(b"k", now), Some(&text("v")));
        assert_eq!(store.get_at(b"k", now + Duration::from_secs(61)), None);
        assert!(!store.exists(b"k"));
    }

    #[test]
    fn test_other_accessors_ignore_expiry() {
        let mut store = Store::new();
        store.set(key("n"), StoredValue::Integer(5), Some(from_unix_millis(0)));

        assert!(store.exists(b"n"));
        assert_eq!(store.incr(&key("n")), Ok(6));
        assert_eq!(store.decr(&key("n")), Ok(5));
        assert_eq!(store.lpush(key("n"), opts(&["x"])), Err(StoreError::WrongType));
        assert_eq!(store.rpush(key("n"), opts(&["x"])), Err(StoreError::WrongType));
        // The expiry instant is still attached.
        assert_eq!(store.stats().expires, 1);
        assert!(store.exists(b"n"));
        assert_eq!(store.get(b"n"), None);
    }

    #[test]
    fn test_pushes_ignore_expiry() {
        let mut store = Store::new();
        store.set(
            key("l"),
            StoredValue::List(opts(&["a"]).into()),
            Some(from_unix_millis(0)),
        );

        assert_eq!(store.lpush(key("l"), opts(&["b"])), Ok(2));
        assert_eq!(store.rpush(key("l"), opts(&["c"])), Ok(3));
        assert!(store.exists(b"l"));
        assert_eq!(store.stats().expires, 1);
        assert_eq!(store.get(b"l"), None);
        assert!(!store.exists(b"l"));
    }

    #[test]
    fn test_del_counts_present_keys() {
        let mut store = Store::new();
        store.set(key("a"), text("1"), None);
        store.set(key("b"), text("2"), Some(from_unix_millis(i64::MAX / 2)));

        assert_eq!(store.del(&[key("a"), key("b"), key("c")]), 2);
        assert!(store.is_empty());
        assert_eq!(store.stats().expires, 0);
        assert_eq!(store.del(&[key("a")]), 0);
    }

    #[test]
    fn test_incr_decr() {
        let mut store = Store::new();
        assert_eq!(store.incr(&key("c")), Ok(1));
        assert_eq!(store.incr(&key("c")), Ok(2));
        assert_eq!(store.decr(&key("c")), Ok(1));
        assert_eq!(store.decr(&key("d")), Ok(-1));
    }

    #[test]
    fn test_incr_parses_text_counters() {
        let mut store = Store::new();
        store.set(key("c"), text("41"), None);
        assert_eq!(store.incr(&key("c")), Ok(42));
        assert_eq!(store.get(b"c"), Some(&StoredValue::Integer(42)));
    }

    #[test]
    fn test_incr_type_errors_leave_value() {
        let mut store = Store::new();
        store.set(key("s"), text("abc"), None);
        assert_eq!(store.incr(&key("s")), Err(StoreError::NotAnInteger));
        assert_eq!(store.get(b"s"), Some(&text("abc")));

        store.rpush(key("l"), vec![key("x")]).unwrap();
        assert_eq!(store.decr(&key("l")), Err(StoreError::WrongType));
    }

    #[test]
    fn test_incr_overflow() {
        let mut store = Store::new();
        store.set(key("max"), StoredValue::Integer(i64::MAX), None);
        assert_eq!(store.incr(&key("max")), Err(StoreError::Overflow));
        assert_eq!(store.get(b"max"), Some(&StoredValue::Integer(i64::MAX)));

        store.set(key("min"), StoredValue::Integer(i64::MIN), None);
        assert_eq!(store.decr(&key("min")), Err(StoreError::Overflow));
    }

    #[test]
    fn test_lpush_order() {
        let mut store = Store::new();
        assert_eq!(store.lpush(key("l"), opts(&["a", "b", "c"])), Ok(3));
        assert_eq!(store.lpush(key("l"), opts(&["d"])), Ok(4));

        let expected: VecDeque<Bytes> = opts(&["d", "c", "b", "a"]).into();
        assert_eq!(store.get(b"l"), Some(&StoredValue::List(expected)));
    }

    #[test]
    fn test_rpush_order() {
        let mut store = Store::new();
        assert_eq!(store.rpush(key("l"), opts(&["a", "b"])), Ok(2));
        assert_eq!(store.rpush(key("l"), opts(&["c"])), Ok(3));

        let expected: VecDeque<Bytes> = opts(&["a", "b", "c"]).into();
        assert_eq!(store.get(b"l"), Some(&StoredValue::List(expected)));
    }

    #[test]
    fn test_push_onto_non_list() {
        let mut store = Store::new();
        store.set(key("s"), text("v"), None);
        assert_eq!(store.lpush(key("s"), opts(&["a"])), Err(StoreError::WrongType));
        assert_eq!(store.rpush(key("s"), opts(&["a"])), Err(StoreError::WrongType));
        assert_eq!(store.get(b"s"), Some(&text("v")));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut store = Store::new();
        store.set(key("s"), text("v"), None);
        store.set(key("n"), StoredValue::Integer(7), Some(from_unix_millis(i64::MAX / 2)));
        store.rpush(key("l"), opts(&["x", "y"])).unwrap();

        let before = store.snapshot();
        store.restore(store.snapshot());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_restore_replaces_everything() {
        let mut store = Store::new();
        store.set(key("old"), text("gone"), None);

        let mut snapshot = Snapshot::default();
        snapshot.data.insert(key("new"), text("here"));
        snapshot.expiry.insert(key("orphan"), from_unix_millis(0));
        store.restore(snapshot);

        assert!(!store.exists(b"old"));
        assert_eq!(store.get(b"new"), Some(&text("here")));
        assert_eq!(store.stats().expires, 0);
    }

    #[test]
    fn test_stored_value_reply_forms() {
        assert_eq!(StoredValue::Integer(3).to_value(), Value::Integer(3));
        assert_eq!(text("v").to_value(), Value::from("v"));
        assert_eq!(
            StoredValue::List(opts(&["a", "b"]).into()).to_value(),
            Value::array(vec![Value::from("a"), Value::from("b")])
        );
    }
}
