//! Command Processor
//!
//! Turns one encoded request into one encoded reply.
//!
//! ## Supported Commands
//!
//! | Command                      | Arity | Reply                        |
//! |------------------------------|-------|------------------------------|
//! | `SET key value [options]`    | >= 3  | `OK`                         |
//! | `GET key`                    | 2     | value or nil                 |
//! | `EXISTS key`                 | 2     | `1` or `0`                   |
//! | `DEL key [key ...]`          | >= 2  | number of keys removed       |
//! | `INCR key` / `DECR key`      | 2     | new value                    |
//! | `LPUSH` / `RPUSH key v [v..]`| >= 3  | new list length              |
//! | `INFO`                       | any   | status report bulk string    |
//! | `SAVE` / `LOAD`              | 1     | `OK`                         |
//! | `COMMAND x`                  | 2     | empty array                  |
//!
//! Anything else, including a known command with the wrong number of
//! arguments, replies nil. Failures are replied as bulk strings beginning
//! with `ERR` or `WRONGTYPE`; the connection is never closed over them.

use crate::commands::info::{HostIntrospection, StatusReport};
use crate::persistence::{PersistError, Persistence};
use crate::protocol::{self, Value};
use crate::storage::{Store, StoreError, StoredValue};
use bytes::Bytes;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, error, info, trace};

/// A failed command. The display text is the reply body.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("ERR invalid key type for '{0}' command")]
    InvalidKey(&'static str),

    #[error("ERR invalid value for '{0}' command")]
    InvalidValue(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ERR failed to save snapshot: {0}")]
    Save(#[source] PersistError),

    #[error("ERR failed to load snapshot: {0}")]
    Load(#[source] PersistError),

    #[error("ERR no snapshot found at {0}")]
    NoSnapshot(String),
}

type CommandResult = Result<Value, CommandError>;

/// Executes commands against a [`Store`].
///
/// One processor serves every connection; callers serialize access to it so
/// each request runs start to finish without interleaving.
pub struct CommandProcessor {
    store: Store,
    persistence: Box<dyn Persistence>,
    host: Box<dyn HostIntrospection>,
}

impl CommandProcessor {
    pub fn new(
        store: Store,
        persistence: impl Persistence + 'static,
        host: impl HostIntrospection + 'static,
    ) -> Self {
        Self {
            store,
            persistence: Box::new(persistence),
            host: Box::new(host),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Decodes `request`, runs it and returns the encoded reply.
    pub fn process(&mut self, request: &[u8]) -> Bytes {
        let reply = match protocol::decode(request) {
            Ok(command) => self.execute(command),
            Err(e) => {
                debug!(error = %e, "Undecodable request");
                error_reply(format!("ERR unknown command format: {}", e))
            }
        };
        reply.encode()
    }

    /// Runs an already decoded request.
    pub fn execute(&mut self, command: Value) -> Value {
        let args = match command {
            Value::Array(args) => args,
            other => {
                return error_reply(format!(
                    "ERR unknown command format: expected an array, got '{}'",
                    other
                ))
            }
        };

        if args.is_empty() {
            return error_reply("ERR empty command received");
        }

        let Some(name) = args[0].as_str().map(str::to_ascii_uppercase) else {
            return Value::Nil;
        };

        match self.dispatch(&name, &args) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(command = %name, error = %e, "Command failed");
                error_reply(e.to_string())
            }
        }
    }

    /// Replaces the store with the persisted snapshot, if there is one.
    ///
    /// Returns the number of keys loaded.
    pub fn load_snapshot(&mut self) -> Result<Option<usize>, PersistError> {
        let Some(snapshot) = self.persistence.load()? else {
            return Ok(None);
        };
        let keys = snapshot.len();
        self.store.restore(snapshot);
        info!(keys, location = %self.persistence.location(), "Snapshot loaded");
        Ok(Some(keys))
    }

    /// `args` still holds the command name at index 0.
    fn dispatch(&mut self, cmd: &str, args: &[Value]) -> CommandResult {
        let argc = args.len();
        match cmd {
            "COMMAND" if argc == 2 => Ok(Value::Array(Vec::new())),
            "INFO" => Ok(self.cmd_info()),
            "SET" if argc >= 3 => self.cmd_set(args),
            "GET" if argc == 2 => self.cmd_get(args),
            "EXISTS" if argc == 2 => self.cmd_exists(args),
            "DEL" if argc >= 2 => self.cmd_del(args),
            "INCR" if argc == 2 => self.cmd_incr(args),
            "DECR" if argc == 2 => self.cmd_decr(args),
            "LPUSH" if argc >= 3 => self.cmd_lpush(args),
            "RPUSH" if argc >= 3 => self.cmd_rpush(args),
            "SAVE" if argc == 1 => self.cmd_save(),
            "LOAD" if argc == 1 => self.cmd_load(),
            _ => {
                trace!(command = %cmd, argc, "Unknown command or wrong arity");
                Ok(Value::Nil)
            }
        }
    }

    // ========================================================================
    // Store commands
    // ========================================================================

    /// SET key value [EX s | PX ms | EXAT unix-s | PXAT unix-ms]...
    fn cmd_set(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("SET", &args[1])?;
        let value = stored_value(&args[2]).ok_or(CommandError::InvalidValue("SET"))?;
        let options = args[3..]
            .iter()
            .map(text_arg)
            .collect::<Option<Vec<_>>>()
            .ok_or(StoreError::Syntax)?;

        self.store.set_with_options(key, value, &options)?;
        Ok(Value::ok())
    }

    fn cmd_get(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("GET", &args[1])?;
        Ok(self
            .store
            .get(&key)
            .map(StoredValue::to_value)
            .unwrap_or(Value::Nil))
    }

    fn cmd_exists(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("EXISTS", &args[1])?;
        Ok(Value::Integer(i64::from(self.store.exists(&key))))
    }

    fn cmd_del(&mut self, args: &[Value]) -> CommandResult {
        let keys = args[1..]
            .iter()
            .map(|arg| key_arg("DEL", arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Integer(self.store.del(&keys) as i64))
    }

    fn cmd_incr(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("INCR", &args[1])?;
        Ok(Value::Integer(self.store.incr(&key)?))
    }

    fn cmd_decr(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("DECR", &args[1])?;
        Ok(Value::Integer(self.store.decr(&key)?))
    }

    fn cmd_lpush(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("LPUSH", &args[1])?;
        let values = push_values("LPUSH", &args[2..])?;
        Ok(Value::Integer(self.store.lpush(key, values)? as i64))
    }

    fn cmd_rpush(&mut self, args: &[Value]) -> CommandResult {
        let key = key_arg("RPUSH", &args[1])?;
        let values = push_values("RPUSH", &args[2..])?;
        Ok(Value::Integer(self.store.rpush(key, values)? as i64))
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    fn cmd_info(&mut self) -> Value {
        let report = StatusReport::collect(self.host.as_mut(), self.store.stats());
        Value::BulkString(Bytes::from(report.render()))
    }

    fn cmd_save(&mut self) -> CommandResult {
        let snapshot = self.store.snapshot();
        if let Err(e) = self.persistence.save(&snapshot) {
            error!(location = %self.persistence.location(), error = %e, "SAVE failed");
            return Err(CommandError::Save(e));
        }
        info!(keys = snapshot.len(), location = %self.persistence.location(), "Snapshot saved");
        Ok(Value::ok())
    }

    fn cmd_load(&mut self) -> CommandResult {
        match self.load_snapshot() {
            Ok(Some(_)) => Ok(Value::ok()),
            Ok(None) => Err(CommandError::NoSnapshot(self.persistence.location())),
            Err(e) => {
                error!(location = %self.persistence.location(), error = %e, "LOAD failed");
                Err(CommandError::Load(e))
            }
        }
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn error_reply(text: impl Into<String>) -> Value {
    Value::BulkString(Bytes::from(text.into()))
}

fn key_arg(cmd: &'static str, arg: &Value) -> Result<Bytes, CommandError> {
    match arg {
        Value::BulkString(b) => Ok(b.clone()),
        Value::SimpleString(s) => Ok(Bytes::from(s.clone())),
        _ => Err(CommandError::InvalidKey(cmd)),
    }
}

/// Strings pass through, integers become their decimal text.
fn text_arg(arg: &Value) -> Option<Bytes> {
    match arg {
        Value::BulkString(b) => Some(b.clone()),
        Value::SimpleString(s) => Some(Bytes::from(s.clone())),
        Value::Integer(n) => Some(Bytes::from(n.to_string())),
        _ => None,
    }
}

fn push_values(cmd: &'static str, args: &[Value]) -> Result<Vec<Bytes>, CommandError> {
    args.iter()
        .map(text_arg)
        .collect::<Option<Vec<_>>>()
        .ok_or(CommandError::InvalidValue(cmd))
}

/// Maps a `SET` value argument to what the store keeps.
fn stored_value(arg: &Value) -> Option<StoredValue> {
    match arg {
        Value::Integer(n) => Some(StoredValue::Integer(*n)),
        Value::BulkString(b) => Some(StoredValue::Bytes(b.clone())),
        Value::SimpleString(s) => Some(StoredValue::Bytes(Bytes::from(s.clone()))),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::BulkString(b) => Some(b.clone()),
                _ => None,
            })
            .collect::<Option<VecDeque<_>>>()
            .map(StoredValue::List),
        _ => None,
    }
}
