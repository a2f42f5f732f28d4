//! Wire Protocol Codec
//!
//! A Redis-like, binary-safe serialization format with five tagged forms.
//!
//! - `types`: the [`Value`] model and its encoder
//! - `parser`: the recursive-descent decoder and stream framing
//!
//! ## Example
//!
//! ```
//! use litekv::protocol::{decode, encode, Value};
//!
//! let request = Value::array(vec![Value::from("GET"), Value::from("name")]);
//! let bytes = encode(&request);
//! assert_eq!(decode(&bytes).unwrap(), request);
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode, frame_len, DecodeError, DecodeResult, Decoder};
pub use types::Value;

use bytes::Bytes;

/// Encodes a value into its wire form.
pub fn encode(value: &Value) -> Bytes {
    value.encode()
}
