//! Recursive-Descent Decoder
//!
//! The decoder walks a byte slice with a single cursor. Array elements are
//! decoded in place by the same cursor, so siblings and nested arrays are
//! located positionally and bulk string payloads are never rescanned for
//! CRLF.
//!
//! Two entry points share this walk:
//!
//! - [`decode`] requires the slice to hold exactly one complete value.
//! - [`frame_len`] reports how long the first value in a buffer is, or
//!   `None` when more bytes are needed. The connection layer uses it to cut
//!   one request out of a stream.

use crate::protocol::types::{prefix, Value, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors raised while decoding wire input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("unknown type tag {0:#04x}")]
    UnknownTag(u8),

    /// No CRLF before the end of input.
    #[error("line terminator not found")]
    MissingTerminator,

    /// Bytes were present where CRLF was required.
    #[error("expected line terminator at offset {0}")]
    BadTerminator(usize),

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Length or count field is not a decimal, or is negative but not -1.
    #[error("invalid length: {0:?}")]
    InvalidLength(String),

    #[error("declared length {declared} exceeds the {remaining} bytes remaining")]
    LengthExceedsBuffer { declared: usize, remaining: usize },

    #[error("array declares {declared} elements but input ended after {decoded}")]
    MissingElements { declared: usize, decoded: usize },

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("nesting depth exceeds {0}")]
    TooDeep(usize),
}

impl DecodeError {
    /// True when the input was a valid prefix that simply ended too soon.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            DecodeError::Empty
                | DecodeError::MissingTerminator
                | DecodeError::LengthExceedsBuffer { .. }
                | DecodeError::MissingElements { .. }
        )
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum array nesting depth (bounds recursion on hostile input).
pub const MAX_NESTING_DEPTH: usize = 32;

/// Decodes exactly one value from `buf`.
///
/// # Example
///
/// ```
/// use litekv::protocol::{decode, Value};
///
/// let value = decode(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
/// assert_eq!(value, Value::array(vec![Value::from("GET"), Value::from("name")]));
/// ```
pub fn decode(buf: &[u8]) -> DecodeResult<Value> {
    let mut decoder = Decoder::new(buf);
    let value = decoder.decode_value()?;
    match decoder.remaining() {
        0 => Ok(value),
        n => Err(DecodeError::TrailingBytes(n)),
    }
}

/// Returns the byte length of the first complete value in `buf`.
///
/// `Ok(None)` means the buffer holds a valid but unfinished prefix.
pub fn frame_len(buf: &[u8]) -> DecodeResult<Option<usize>> {
    let mut decoder = Decoder::new(buf);
    match decoder.skip_value() {
        Ok(()) => Ok(Some(decoder.pos)),
        Err(e) if e.is_incomplete() => Ok(None),
        Err(e) => Err(e),
    }
}

/// A cursor over one input buffer.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Decodes the value starting at the cursor and advances past it.
    pub fn decode_value(&mut self) -> DecodeResult<Value> {
        let tag = self.read_tag()?;
        match tag {
            prefix::SIMPLE_STRING => {
                let line = self.read_line()?;
                let s = std::str::from_utf8(line)
                    .map_err(|_| DecodeError::InvalidUtf8("simple string"))?;
                Ok(Value::SimpleString(s.to_string()))
            }
            prefix::ERROR => {
                let line = self.read_line()?;
                let s =
                    std::str::from_utf8(line).map_err(|_| DecodeError::InvalidUtf8("error"))?;
                Ok(Value::Error(s.to_string()))
            }
            prefix::INTEGER => {
                let line = self.read_line()?;
                Ok(Value::Integer(parse_integer(line)?))
            }
            prefix::BULK_STRING => match self.read_bulk()? {
                Some(data) => Ok(Value::BulkString(Bytes::copy_from_slice(data))),
                None => Ok(Value::Nil),
            },
            prefix::ARRAY => {
                let Some(count) = self.read_length()? else {
                    return Ok(Value::NullArray);
                };
                self.enter()?;
                // Capacity is bounded by the input so a hostile count cannot
                // force a huge allocation.
                let mut elements = Vec::with_capacity(count.min(self.remaining()));
                for decoded in 0..count {
                    if self.remaining() == 0 {
                        return Err(DecodeError::MissingElements {
                            declared: count,
                            decoded,
                        });
                    }
                    elements.push(self.decode_value()?);
                }
                self.depth -= 1;
                Ok(Value::Array(elements))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    /// Advances past one value without building it.
    fn skip_value(&mut self) -> DecodeResult<()> {
        let tag = self.read_tag()?;
        match tag {
            prefix::SIMPLE_STRING | prefix::ERROR => self.read_line().map(|_| ()),
            prefix::INTEGER => {
                let line = self.read_line()?;
                parse_integer(line).map(|_| ())
            }
            prefix::BULK_STRING => self.read_bulk().map(|_| ()),
            prefix::ARRAY => {
                let Some(count) = self.read_length()? else {
                    return Ok(());
                };
                self.enter()?;
                for decoded in 0..count {
                    if self.remaining() == 0 {
                        return Err(DecodeError::MissingElements {
                            declared: count,
                            decoded,
                        });
                    }
                    self.skip_value()?;
                }
                self.depth -= 1;
                Ok(())
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    fn enter(&mut self) -> DecodeResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(DecodeError::TooDeep(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn read_tag(&mut self) -> DecodeResult<u8> {
        let tag = *self.buf.get(self.pos).ok_or(DecodeError::Empty)?;
        self.pos += 1;
        Ok(tag)
    }

    /// Returns the bytes up to the next CRLF and moves past the CRLF.
    fn read_line(&mut self) -> DecodeResult<&'a [u8]> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let end = find_crlf(rest).ok_or(DecodeError::MissingTerminator)?;
        self.pos += end + CRLF.len();
        Ok(&rest[..end])
    }

    /// Reads a length/count line. `None` is the `-1` null marker.
    fn read_length(&mut self) -> DecodeResult<Option<usize>> {
        let line = self.read_line()?;
        let text = std::str::from_utf8(line)
            .map_err(|_| DecodeError::InvalidLength(String::from_utf8_lossy(line).into_owned()))?;
        let n: i64 = text
            .parse()
            .map_err(|_| DecodeError::InvalidLength(text.to_string()))?;
        match n {
            -1 => Ok(None),
            n if n < 0 => Err(DecodeError::InvalidLength(text.to_string())),
            n => usize::try_from(n)
                .map(Some)
                .map_err(|_| DecodeError::InvalidLength(text.to_string())),
        }
    }

    /// Reads a bulk string body after its tag. `None` is the null bulk string.
    fn read_bulk(&mut self) -> DecodeResult<Option<&'a [u8]>> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };
        let remaining = self.remaining();
        let needed = len
            .checked_add(CRLF.len())
            .ok_or_else(|| DecodeError::InvalidLength(len.to_string()))?;
        if needed > remaining {
            return Err(DecodeError::LengthExceedsBuffer {
                declared: len,
                remaining,
            });
        }
        let buf = self.buf;
        let start = self.pos;
        let data = &buf[start..start + len];
        if &buf[start + len..start + needed] != CRLF {
            return Err(DecodeError::BadTerminator(start + len));
        }
        self.pos += needed;
        Ok(Some(data))
    }
}

fn parse_integer(line: &[u8]) -> DecodeResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DecodeError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Position of the first `\r\n` in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_decode_simple_string() {
        assert_eq!(decode(b"+OK\r\n").unwrap(), Value::simple_string("OK"));
    }

    #[test]
    fn test_decode_error() {
        assert_eq!(
            decode(b"-ERR unknown command\r\n").unwrap(),
            Value::error("ERR unknown command")
        );
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(decode(b":1000\r\n").unwrap(), Value::Integer(1000));
        assert_eq!(decode(b":-42\r\n").unwrap(), Value::Integer(-42));
    }

    #[test]
    fn test_decode_bulk_strings() {
        assert_eq!(decode(b"$5\r\nhello\r\n").unwrap(), bulk("hello"));
        assert_eq!(decode(b"$0\r\n\r\n").unwrap(), bulk(""));
        assert_eq!(decode(b"$-1\r\n").unwrap(), Value::Nil);
    }

    #[test]
    fn test_bulk_string_is_binary_safe() {
        let value = decode(b"$9\r\nab\r\n\x00cd\r\n\r\n").unwrap();
        assert_eq!(value, Value::bulk_string(Bytes::from_static(b"ab\r\n\x00cd\r\n")));
    }

    #[test]
    fn test_decode_arrays() {
        assert_eq!(decode(b"*0\r\n").unwrap(), Value::Array(vec![]));
        assert_eq!(decode(b"*-1\r\n").unwrap(), Value::NullArray);
        assert_eq!(
            decode(b"*3\r\n+OK\r\n:100\r\n$5\r\nhello\r\n").unwrap(),
            Value::array(vec![
                Value::simple_string("OK"),
                Value::Integer(100),
                bulk("hello"),
            ])
        );
    }

    #[test]
    fn test_sibling_arrays_parse_positionally() {
        let input = b"*3\r\n*2\r\n:1\r\n*1\r\n$2\r\n\r\n\r\n*0\r\n$1\r\nz\r\n";
        assert_eq!(
            decode(input).unwrap(),
            Value::array(vec![
                Value::array(vec![
                    Value::Integer(1),
                    Value::array(vec![bulk("\r\n")]),
                ]),
                Value::array(vec![]),
                bulk("z"),
            ])
        );
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let values = vec![
            Value::Nil,
            Value::NullArray,
            Value::Integer(i64::MIN),
            bulk(""),
            bulk("line\r\nbreak"),
            Value::simple_string("PONG"),
            Value::error("ERR boom"),
            Value::array(vec![
                bulk("depth1"),
                Value::array(vec![
                    Value::Nil,
                    Value::array(vec![Value::Integer(7), bulk("$3\r\n"), Value::NullArray]),
                ]),
            ]),
        ];

        for value in values {
            assert_eq!(decode(&value.encode()).unwrap(), value);
        }
    }

    #[test]
    fn test_one_byte_short_bulk_string_fails() {
        let err = decode(b"$5\r\nhell").unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthExceedsBuffer {
                declared: 5,
                remaining: 4
            }
        );
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_bulk_string_missing_trailing_crlf() {
        assert_eq!(
            decode(b"$3\r\nabcXY").unwrap_err(),
            DecodeError::BadTerminator(7)
        );
    }

    #[test]
    fn test_missing_terminator() {
        assert_eq!(decode(b"+OK").unwrap_err(), DecodeError::MissingTerminator);
        assert_eq!(decode(b"$5").unwrap_err(), DecodeError::MissingTerminator);
    }

    #[test]
    fn test_non_numeric_fields() {
        assert!(matches!(
            decode(b":abc\r\n").unwrap_err(),
            DecodeError::InvalidInteger(_)
        ));
        assert!(matches!(
            decode(b"$x\r\nabc\r\n").unwrap_err(),
            DecodeError::InvalidLength(_)
        ));
        assert!(matches!(
            decode(b"*-2\r\n").unwrap_err(),
            DecodeError::InvalidLength(_)
        ));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(decode(b"@oops\r\n").unwrap_err(), DecodeError::UnknownTag(b'@'));
    }

    #[test]
    fn test_array_with_too_few_elements() {
        assert_eq!(
            decode(b"*3\r\n:1\r\n:2\r\n").unwrap_err(),
            DecodeError::MissingElements {
                declared: 3,
                decoded: 2
            }
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode(b"").unwrap_err(), DecodeError::Empty);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert_eq!(decode(b":1\r\n:2\r\n").unwrap_err(), DecodeError::TrailingBytes(4));
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert_eq!(
            decode(&input).unwrap_err(),
            DecodeError::TooDeep(MAX_NESTING_DEPTH)
        );
    }

    #[test]
    fn test_frame_len() {
        let one = b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";
        assert_eq!(frame_len(one).unwrap(), Some(one.len()));

        let mut two = one.to_vec();
        two.extend_from_slice(b"*1\r\n$4\r\nINFO\r\n");
        assert_eq!(frame_len(&two).unwrap(), Some(one.len()));

        assert_eq!(frame_len(&one[..one.len() - 1]).unwrap(), None);
        assert_eq!(frame_len(b"*2\r\n$3\r\nGET\r\n").unwrap(), None);
        assert_eq!(frame_len(b"").unwrap(), None);
        assert!(frame_len(b"!bad\r\n").is_err());
    }
}
