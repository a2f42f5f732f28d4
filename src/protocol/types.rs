//! Wire Value Model and Encoder
//!
//! Every request, reply and snapshot passes through [`Value`]. Each form on
//! the wire starts with a one-byte tag and ends with CRLF:
//!
//! - `+` Simple string: `+OK\r\n`
//! - `-` Error: `-ERR unknown\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk string: `$5\r\nhello\r\n`, null bulk string `$-1\r\n`
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`, null array `*-1\r\n`
//!
//! Bulk strings are length-prefixed, so their payload may contain CRLF.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used by every form.
pub const CRLF: &[u8] = b"\r\n";

/// Leading tag bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A decoded or to-be-encoded wire value.
///
/// `SimpleString`, `Error`, `Nil` and `NullArray` only ever appear in
/// replies; user data is held as bulk strings, integers and arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null bulk string, `$-1\r\n`.
    Nil,

    /// Null array, `*-1\r\n`.
    NullArray,

    /// Signed 64-bit integer.
    Integer(i64),

    /// Binary-safe, length-prefixed byte string.
    BulkString(Bytes),

    /// Single-line text without CR or LF.
    SimpleString(String),

    /// Single-line error text.
    Error(String),

    /// Ordered sequence of values, possibly nested.
    Array(Vec<Value>),
}

impl Value {
    pub fn simple_string(s: impl Into<String>) -> Self {
        Value::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Value::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    /// Creates a bulk string.
    ///
    /// # Example
    /// ```
    /// use litekv::protocol::Value;
    /// use bytes::Bytes;
    /// let bulk = Value::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.encode().as_ref(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Value::BulkString(data.into())
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values)
    }

    /// The `+OK` acknowledgement.
    pub fn ok() -> Self {
        Value::SimpleString("OK".to_string())
    }

    /// Encodes the value into its wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encodes the value into an existing buffer, recursing into arrays.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Value::Nil => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
            Value::NullArray => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
            Value::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Value::BulkString(data) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Value::SimpleString(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Value::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Value::Array(values) => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(values.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for value in values {
                    value.encode_into(buf);
                }
            }
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Value::BulkString(data) => data.len() + 16,
            Value::Array(values) => 16 + values.len() * 16,
            _ => 16,
        }
    }

    /// Returns the bytes of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::BulkString(b) => Some(b),
            Value::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Returns the text of a bulk or simple string if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::BulkString(Bytes::from(s))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::BulkString(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil | Value::NullArray => write!(f, "(nil)"),
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Value::SimpleString(s) => write!(f, "{}", s),
            Value::Error(s) => write!(f, "(error) {}", s),
            Value::Array(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}
