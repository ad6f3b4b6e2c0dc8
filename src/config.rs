//! Server configuration.
//!
//! Everything is set from the command line (see `main.rs`); there is no
//! config file. The defaults reproduce a plain `redis-server` on 6379 with
//! the reply conventions described on each option.

use crate::protocol::frame::DEFAULT_MAX_BUFFER;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::ValueEnum;

/// What to reply when the command name is not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnknownCommandPolicy {
    /// Reply `+PONG`, as if the client had sent PING.
    #[default]
    Pong,
    /// Reply `ERR unknown command '<name>'`.
    Error,
}

/// How validation failures (arity, syntax) are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ErrorReplyStyle {
    /// `+ERR <message>\r\n`
    #[default]
    Simple,
    /// `-ERR <message>\r\n`, the RESP error type
    Error,
}

/// Runtime configuration for the listener and every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Reply for unrecognized command names
    pub unknown_command: UnknownCommandPolicy,
    /// Encoding of validation errors
    pub error_replies: ErrorReplyStyle,
    /// Per-connection cap on buffered, not yet framed bytes. Also bounds the
    /// longest accepted bulk string.
    pub max_buffer_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            unknown_command: UnknownCommandPolicy::default(),
            error_replies: ErrorReplyStyle::default(),
            max_buffer_bytes: DEFAULT_MAX_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
