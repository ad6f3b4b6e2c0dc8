//! Reply Encoding
//!
//! Every command produces exactly one [`RespValue`], which is written to the
//! client with [`RespValue::serialize_into`]. The server only ever emits
//! these shapes:
//!
//! | Reply            | Wire form                   | Used by                  |
//! |------------------|-----------------------------|--------------------------|
//! | simple string    | `+PONG\r\n`                 | PING, SET, ECHO, `+ERR`  |
//! | error            | `-ERR syntax error\r\n`     | `--error-replies error`  |
//! | bulk string      | `$3\r\nbar\r\n`             | GET, binary ECHO         |
//! | nil bulk string  | `$-1\r\n`                   | GET on a missing key     |
//! | array            | `*2\r\n$3\r\nGET\r\n...`    | re-encoding requests     |
//!
//! Bulk payloads are written verbatim behind their length; nothing is
//! escaped.

use bytes::Bytes;
use std::fmt;

/// Line terminator for every RESP element.
pub const CRLF: &[u8] = b"\r\n";

/// Leading type bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply, ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status text. Must not contain CR or LF.
    SimpleString(String),
    /// Error text, sent with the `-` prefix.
    Error(String),
    BulkString(Bytes),
    /// `$-1\r\n`, the reply for a missing key.
    Null,
    Array(Vec<RespValue>),
}

impl RespValue {
    /// # Example
    /// ```
    /// use respkv::protocol::RespValue;
    /// assert_eq!(RespValue::simple_string("OK").serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// # Example
    /// ```
    /// use respkv::protocol::RespValue;
    /// assert_eq!(RespValue::bulk_string("a\r\nb").serialize(), b"$4\r\na\r\nb\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    pub fn pong() -> Self {
        Self::simple_string("PONG")
    }

    /// Returns true for replies that report a failure, in either the
    /// `-ERR ...` form or the `+ERR ...` simple string form.
    pub fn is_error(&self) -> bool {
        match self {
            RespValue::Error(_) => true,
            RespValue::SimpleString(s) => s.starts_with("ERR"),
            _ => false,
        }
    }

    /// Exact number of bytes [`serialize_into`](Self::serialize_into) appends.
    pub fn encoded_len(&self) -> usize {
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => 1 + s.len() + 2,
            RespValue::BulkString(data) => header_len(data.len()) + data.len() + 2,
            RespValue::Null => 5,
            RespValue::Array(values) => {
                header_len(values.len()) + values.iter().map(Self::encoded_len).sum::<usize>()
            }
        }
    }

    /// Encodes into a freshly allocated buffer of the exact size.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the wire form to `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::BulkString(data) => {
                write_header(buf, prefix::BULK_STRING, data.len());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_header(buf, prefix::ARRAY, values.len());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }
}

fn write_line(buf: &mut Vec<u8>, kind: u8, body: &[u8]) {
    buf.push(kind);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

fn write_header(buf: &mut Vec<u8>, kind: u8, len: usize) {
    write_line(buf, kind, len.to_string().as_bytes());
}

/// Length of `<prefix><decimal len>\r\n`.
fn header_len(len: usize) -> usize {
    let digits = len.checked_ilog10().map_or(1, |d| d as usize + 1);
    1 + digits + 2
}

/// One-line rendering for logs. Binary payloads show their size only.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "+{}", s),
            RespValue::Error(s) => write!(f, "-{}", s),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(text) => write!(f, "{:?}", text),
                Err(_) => write!(f, "<{} bytes>", data.len()),
            },
            RespValue::Null => f.write_str("(nil)"),
            RespValue::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}
