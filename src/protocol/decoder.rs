//! Request Decoder
//!
//! Turns one framed request into a [`Command`]: the ordered, binary-safe
//! argument list. The decoder walks a cursor forward through the frame:
//!
//! 1. `*<N>\r\n` gives the element count.
//! 2. For each element, `$<len>\r\n` gives the payload length, the next
//!    `len` bytes are the argument, and the two bytes after them are the
//!    payload terminator.
//!
//! There is no backtracking and no case normalization; argument 0 is handed
//! to the dispatcher exactly as the client sent it. Arguments are
//! zero-copy slices of the frame.

use crate::protocol::frame::{
    check_array_len, check_bulk_len, read_header, FrameError, FrameResult, MAX_BULK_SIZE,
};
use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;

/// A decoded request: command name followed by its operands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Builds a command from string-like parts. Handy for tests and tools.
    pub fn from_parts<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Self::new(parts.into_iter().map(Into::into).collect())
    }

    /// The command name as sent (argument 0), if any.
    pub fn name(&self) -> Option<&Bytes> {
        self.args.first()
    }

    /// All arguments, including the name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn into_args(self) -> Vec<Bytes> {
        self.args
    }

    /// Re-encodes the command as a RESP array of bulk strings.
    pub fn to_resp(&self) -> RespValue {
        RespValue::array(
            self.args
                .iter()
                .cloned()
                .map(RespValue::BulkString)
                .collect(),
        )
    }
}

/// Decodes a frame holding exactly one request.
///
/// A truncated frame or one with bytes after the last element is a
/// protocol error; the [`FrameReader`](crate::protocol::FrameReader) only
/// hands out exact frames, so this only fires on misuse or corrupt input.
pub fn decode(frame: &Bytes) -> FrameResult<Command> {
    let truncated = || FrameError::ProtocolError("truncated request".to_string());

    let (count, mut cursor) = read_header(frame, 0, prefix::ARRAY)?.ok_or_else(truncated)?;
    let count = check_array_len(count)?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let (len, data_start) =
            read_header(frame, cursor, prefix::BULK_STRING)?.ok_or_else(truncated)?;
        let len = check_bulk_len(len, MAX_BULK_SIZE)?;

        let data_end = data_start + len;
        if frame.len() < data_end + 2 {
            return Err(truncated());
        }
        if &frame[data_end..data_end + 2] != CRLF {
            return Err(FrameError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        args.push(frame.slice(data_start..data_end));
        cursor = data_end + 2;
    }

    if cursor != frame.len() {
        return Err(FrameError::ProtocolError(format!(
            "{} unexpected bytes after request",
            frame.len() - cursor
        )));
    }

    Ok(Command::new(args))
}
