//! Request Framing
//!
//! TCP delivers a byte stream, not messages. A client may send half a
//! command in one packet, or several commands in one packet. The
//! [`FrameReader`] accumulates bytes per connection and tells the session
//! loop when at least one whole request is available.
//!
//! ## Length-Accounted Framing
//!
//! A request is an array of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<len>\r\n<len bytes>\r\n      (N times)
//! ```
//!
//! Completeness is decided by walking the declared lengths, never by looking
//! at the last two bytes of the buffer. A payload that itself ends in `\r\n`
//! therefore cannot cut a frame short:
//!
//! ```text
//! *2\r\n$4\r\nECHO\r\n$3\r\na\r\n     <- ends in CRLF, but the payload terminator is still missing
//! ```
//!
//! [`frame_length`] returns:
//! - `Ok(Some(n))` - the first `n` bytes are exactly one request
//! - `Ok(None)` - the request is incomplete, read more
//! - `Err(FrameError)` - the bytes can never become a valid request

use crate::protocol::types::{prefix, CRLF};
use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Errors raised while framing or decoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The request does not start with `*`. Inline commands and bare
    /// values are not accepted as requests.
    #[error("unknown request type: {0:#04x}")]
    UnknownRequestType(u8),

    /// A length header is not an integer.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// A negative array or bulk string length.
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    /// Structural violation (wrong element type, missing CRLF, ...).
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A bulk string longer than [`MAX_BULK_SIZE`] or than the reader's buffer cap.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Returns true if the session may drop the buffered bytes and carry on.
    ///
    /// Only an unsupported request shape is recoverable; a malformed array
    /// leaves the stream misaligned and the connection must close.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::UnknownRequestType(_))
    }
}

/// Result type for framing and decoding.
pub type FrameResult<T> = Result<T, FrameError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one request array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Default cap on bytes buffered for one connection (64 MB)
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Reads a `<type><integer>\r\n` header starting at `pos`.
///
/// Returns the integer and the offset just past the CRLF, or `None` if the
/// header line is not complete yet.
pub(crate) fn read_header(
    buf: &[u8],
    pos: usize,
    expected: u8,
) -> FrameResult<Option<(i64, usize)>> {
    let Some(&found) = buf.get(pos) else {
        return Ok(None);
    };
    if found != expected {
        return Err(unexpected_prefix(expected, found));
    }

    let start = pos + 1;
    let Some(end) = find_crlf(&buf[start..]) else {
        return Ok(None);
    };

    let digits = &buf[start..start + end];
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| FrameError::InvalidInteger(String::from_utf8_lossy(digits).into_owned()))?;

    Ok(Some((n, start + end + 2)))
}

fn unexpected_prefix(expected: u8, found: u8) -> FrameError {
    if expected == prefix::ARRAY {
        FrameError::UnknownRequestType(found)
    } else {
        FrameError::ProtocolError(format!(
            "expected '{}', found {:#04x}",
            expected as char, found
        ))
    }
}

/// Validates a declared bulk string length against `max`.
pub(crate) fn check_bulk_len(len: i64, max: usize) -> FrameResult<usize> {
    if len < 0 {
        return Err(FrameError::InvalidLength(len));
    }
    let len = len as usize;
    if len > max {
        return Err(FrameError::FrameTooLarge { size: len, max });
    }
    Ok(len)
}

/// Validates a declared array length.
pub(crate) fn check_array_len(count: i64) -> FrameResult<usize> {
    if count < 0 {
        return Err(FrameError::InvalidLength(count));
    }
    let count = count as usize;
    if count > MAX_ARRAY_LEN {
        return Err(FrameError::ProtocolError(format!(
            "too many elements: {} (max: {})",
            count, MAX_ARRAY_LEN
        )));
    }
    Ok(count)
}

/// Computes the length of the first complete request in `buf`.
///
/// Nothing is consumed; the caller decides what to do with the bytes.
pub fn frame_length(buf: &[u8]) -> FrameResult<Option<usize>> {
    frame_length_within(buf, MAX_BULK_SIZE)
}

/// Like [`frame_length`], but rejects any bulk string longer than `max_bulk`
/// as soon as its header arrives.
fn frame_length_within(buf: &[u8], max_bulk: usize) -> FrameResult<Option<usize>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let (count, mut pos) = match read_header(buf, 0, prefix::ARRAY)? {
        Some(header) => header,
        None => return Ok(None),
    };
    let count = check_array_len(count)?;

    for _ in 0..count {
        let (len, data_start) = match read_header(buf, pos, prefix::BULK_STRING)? {
            Some(header) => header,
            None => return Ok(None),
        };
        let len = check_bulk_len(len, max_bulk)?;

        let end = data_start + len + 2;
        if buf.len() < end {
            return Ok(None);
        }
        if &buf[end - 2..end] != CRLF {
            return Err(FrameError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }
        pos = end;
    }

    Ok(Some(pos))
}

/// Per-connection accumulator of received bytes.
///
/// At any point the buffer holds exactly the bytes received that are not
/// yet part of a frame handed out by [`FrameReader::next_frame`].
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    max_buffer: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl FrameReader {
    /// Creates an empty reader that refuses to buffer more than `max_buffer` bytes.
    pub fn new(max_buffer: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE.min(max_buffer)),
            max_buffer,
        }
    }

    /// Appends newly received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Gives the socket direct access to the buffer, so reads append in place.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }
        &mut self.buffer
    }

    /// Reports whether at least one complete request is buffered.
    pub fn has_frame(&self) -> FrameResult<bool> {
        Ok(self.frame_length()?.is_some())
    }

    /// Splits the next complete request off the front of the buffer.
    ///
    /// Any bytes after it (the start of a pipelined request) stay buffered.
    pub fn next_frame(&mut self) -> FrameResult<Option<Bytes>> {
        match self.frame_length()? {
            Some(len) => Ok(Some(self.buffer.split_to(len).freeze())),
            None => Ok(None),
        }
    }

    // A bulk string that cannot fit in the buffer is refused at its header
    // instead of after filling the buffer.
    fn frame_length(&self) -> FrameResult<Option<usize>> {
        frame_length_within(&self.buffer, MAX_BULK_SIZE.min(self.max_buffer))
    }

    /// Drops everything buffered and returns how many bytes were discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.buffer.len();
        self.buffer.clear();
        n
    }

    /// Returns true once the buffer reached its cap without yielding a frame.
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
