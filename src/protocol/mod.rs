//! RESP Protocol Implementation
//!
//! This module covers the wire side of the server: the request subset it
//! accepts (arrays of bulk strings) and the reply shapes it emits.
//!
//! ## Modules
//!
//! - `frame`: per-connection byte accumulation and exact request framing
//! - `decoder`: frame -> [`Command`]
//! - `types`: the `RespValue` reply type and its serialization
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{decode, FrameReader, RespValue};
//! use bytes::Bytes;
//!
//! let mut reader = FrameReader::default();
//! reader.extend(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! let frame = reader.next_frame().unwrap().unwrap();
//! let command = decode(&frame).unwrap();
//! assert_eq!(command.len(), 2);
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod decoder;
pub mod frame;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{decode, Command};
pub use frame::{frame_length, FrameError, FrameReader, FrameResult};
pub use types::RespValue;
