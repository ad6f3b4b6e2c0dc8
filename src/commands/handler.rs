//! Command Dispatcher
//!
//! Maps a decoded [`Command`] to its handler by case-insensitive name,
//! checks arity, runs it against the shared [`StorageEngine`] and produces
//! exactly one reply.
//!
//! ## Supported Commands
//!
//! | Command                  | Arity  | Reply                          |
//! |--------------------------|--------|--------------------------------|
//! | `PING`                   | any    | `+PONG`                        |
//! | `ECHO message`           | 2      | the message                    |
//! | `SET key value [PX ms]`  | 3 or 5 | `+OK`                          |
//! | `GET key`                | 2      | bulk string, or nil            |
//!
//! Arity counts the command name. Anything else is answered according to
//! the configured [`UnknownCommandPolicy`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │   lookup()  │───>│   arity     │───>│  cmd_*()    │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::config::{ErrorReplyStyle, ServerConfig, UnknownCommandPolicy};
use crate::protocol::{Command, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// The commands this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Echo,
    Set,
    Get,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Ping,
        CommandKind::Echo,
        CommandKind::Set,
        CommandKind::Get,
    ];

    /// Canonical (upper case) name.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Ping => "PING",
            CommandKind::Echo => "ECHO",
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
        }
    }

    /// Case-insensitive lookup of a command name as sent by the client.
    pub fn lookup(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| name.eq_ignore_ascii_case(kind.name().as_bytes()))
    }
}

/// Executes commands against the shared store.
///
/// Cloning is cheap; every connection gets its own clone.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    unknown_command: UnknownCommandPolicy,
    error_replies: ErrorReplyStyle,
}

impl CommandHandler {
    /// Creates a handler with the default reply conventions.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            unknown_command: UnknownCommandPolicy::default(),
            error_replies: ErrorReplyStyle::default(),
        }
    }

    /// Creates a handler using the reply conventions from `config`.
    pub fn with_config(storage: Arc<StorageEngine>, config: &ServerConfig) -> Self {
        Self::new(storage)
            .unknown_command(config.unknown_command)
            .error_replies(config.error_replies)
    }

    pub fn unknown_command(mut self, policy: UnknownCommandPolicy) -> Self {
        self.unknown_command = policy;
        self
    }

    pub fn error_replies(mut self, style: ErrorReplyStyle) -> Self {
        self.error_replies = style;
        self
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a command and returns its reply.
    pub fn execute(&self, command: &Command) -> RespValue {
        let args = command.args();
        let name = args.first().map_or(&[][..], |name| &name[..]);

        match CommandKind::lookup(name) {
            Some(kind) => {
                trace!(command = kind.name(), argc = args.len(), "Dispatching");
                self.dispatch(kind, args)
            }
            None => self.unknown(name),
        }
    }

    fn dispatch(&self, kind: CommandKind, args: &[Bytes]) -> RespValue {
        match kind {
            CommandKind::Ping => self.cmd_ping(args),
            CommandKind::Echo => self.cmd_echo(args),
            CommandKind::Set => self.cmd_set(args),
            CommandKind::Get => self.cmd_get(args),
        }
    }

    // ========================================================================
    // Replies
    // ========================================================================

    fn error(&self, message: impl Into<String>) -> RespValue {
        match self.error_replies {
            ErrorReplyStyle::Simple => RespValue::simple_string(message),
            ErrorReplyStyle::Error => RespValue::error(message),
        }
    }

    fn wrong_arity(&self, kind: CommandKind) -> RespValue {
        self.error(format!(
            "ERR wrong number of arguments for '{}' command",
            kind.name().to_ascii_lowercase()
        ))
    }

    fn unknown(&self, name: &[u8]) -> RespValue {
        match self.unknown_command {
            UnknownCommandPolicy::Pong => RespValue::pong(),
            UnknownCommandPolicy::Error => {
                let printable: String = String::from_utf8_lossy(name)
                    .chars()
                    .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
                    .collect();
                self.error(format!("ERR unknown command '{}'", printable))
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// PING [ignored ...]
    fn cmd_ping(&self, _args: &[Bytes]) -> RespValue {
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> RespValue {
        let [_, message] = args else {
            return self.wrong_arity(CommandKind::Echo);
        };

        // A simple string cannot carry CR/LF or arbitrary bytes
        match std::str::from_utf8(message) {
            Ok(text) if !text.contains(['\r', '\n']) => RespValue::simple_string(text),
            _ => RespValue::bulk_string(message.clone()),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        match args {
            [_, key, value] => {
                self.storage.set(key.clone(), value.clone());
                RespValue::ok()
            }
            [_, key, value, option, operand] => {
                if !option.eq_ignore_ascii_case(b"PX") {
                    return self.error("ERR syntax error");
                }
                let Some(ms) = parse_millis(operand) else {
                    return self.error("ERR value is not an integer or out of range");
                };
                self.storage
                    .set_with_ttl(key.clone(), value.clone(), Duration::from_millis(ms));
                RespValue::ok()
            }
            _ => self.wrong_arity(CommandKind::Set),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let [_, key] = args else {
            return self.wrong_arity(CommandKind::Get);
        };

        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }
}

/// Parses a non-negative decimal millisecond count. Only ASCII digits are
/// accepted, so `+100` and ` 100` are refused like any other non-integer.
fn parse_millis(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    fn make_command(args: &[&str]) -> Command {
        Command::from_parts(args.iter().map(|s| Bytes::from(s.to_string())))
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(CommandKind::lookup(b"ping"), Some(CommandKind::Ping));
        assert_eq!(CommandKind::lookup(b"EcHo"), Some(CommandKind::Echo));
        assert_eq!(CommandKind::lookup(b"set"), Some(CommandKind::Set));
        assert_eq!(CommandKind::lookup(b"GET"), Some(CommandKind::Get));
        assert_eq!(CommandKind::lookup(b"GETS"), None);
        assert_eq!(CommandKind::lookup(b""), None);
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["PING"]));
        assert_eq!(response.serialize(), b"+PONG\r\n");

        let response = handler.execute(&make_command(&["ping"]));
        assert_eq!(response, RespValue::pong());
    }

    #[test]
    fn test_ping_ignores_trailing_arguments() {
        let handler = create_handler();
        let response = handler.execute(&make_command(&["PING", "hello", "there"]));
        assert_eq!(response, RespValue::pong());
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["ECHO", "hello world"]));
        assert_eq!(response.serialize(), b"+hello world\r\n");
    }

    #[test]
    fn test_echo_binary_payload_is_bulk() {
        let handler = create_handler();
        let payload = Bytes::from_static(b"line1\r\nline2\x00");

        let response = handler.execute(&Command::from_parts([Bytes::from("ECHO"), payload.clone()]));
        assert_eq!(response, RespValue::bulk_string(payload));
    }

    #[test]
    fn test_echo_arity() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["ECHO"]));
        assert_eq!(
            response,
            RespValue::simple_string("ERR wrong number of arguments for 'echo' command")
        );
        assert!(response.is_error());

        let response = handler.execute(&make_command(&["ECHO", "a", "b"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["GET", "nonexistent"]));
        assert_eq!(response, RespValue::null());
        assert_eq!(response.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_set_overwrites() {
        let handler = create_handler();

        handler.execute(&make_command(&["SET", "key", "one"]));
        handler.execute(&make_command(&["set", "key", "two"]));

        let response = handler.execute(&make_command(&["get", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("two")));
    }

    #[test]
    fn test_set_px() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["SET", "key", "value", "px", "100"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("value")));

        std::thread::sleep(Duration::from_millis(150));

        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_set_px_zero_expires_immediately() {
        let handler = create_handler();

        handler.execute(&make_command(&["SET", "key", "value", "PX", "0"]));
        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_set_without_px_clears_expiry() {
        let handler = create_handler();

        handler.execute(&make_command(&["SET", "key", "old", "PX", "50"]));
        handler.execute(&make_command(&["SET", "key", "new"]));

        std::thread::sleep(Duration::from_millis(100));

        let response = handler.execute(&make_command(&["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("new")));
    }

    #[test]
    fn test_set_arity() {
        let handler = create_handler();

        for args in [
            &["SET"][..],
            &["SET", "k"][..],
            &["SET", "k", "v", "PX"][..],
            &["SET", "k", "v", "PX", "10", "extra"][..],
        ] {
            let response = handler.execute(&make_command(args));
            assert_eq!(
                response,
                RespValue::simple_string("ERR wrong number of arguments for 'set' command"),
                "args: {:?}",
                args
            );
        }

        // Nothing was written
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_set_bad_option() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["SET", "k", "v", "EX", "10"]));
        assert_eq!(response, RespValue::simple_string("ERR syntax error"));
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_set_bad_milliseconds() {
        let handler = create_handler();

        for ms in ["-1", "+100", " 100", "ten", "1.5", "", "99999999999999999999999"] {
            let response = handler.execute(&make_command(&["SET", "k", "v", "PX", ms]));
            assert_eq!(
                response,
                RespValue::simple_string("ERR value is not an integer or out of range")
            );
        }
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_get_arity() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["GET"]));
        assert_eq!(
            response,
            RespValue::simple_string("ERR wrong number of arguments for 'get' command")
        );

        let response = handler.execute(&make_command(&["GET", "a", "b"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_unknown_command_defaults_to_pong() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["FLUSHALL"]));
        assert_eq!(response, RespValue::pong());

        let response = handler.execute(&Command::default());
        assert_eq!(response, RespValue::pong());
    }

    #[test]
    fn test_unknown_command_error_policy() {
        let handler = create_handler().unknown_command(UnknownCommandPolicy::Error);

        let response = handler.execute(&make_command(&["FLUSHALL"]));
        assert_eq!(
            response,
            RespValue::simple_string("ERR unknown command 'FLUSHALL'")
        );

        let response = handler.execute(&make_command(&["BAD\r\nNAME"]));
        assert_eq!(response.serialize(), b"+ERR unknown command 'BAD  NAME'\r\n");
    }

    #[test]
    fn test_resp_error_style() {
        let handler = create_handler().error_replies(ErrorReplyStyle::Error);

        let response = handler.execute(&make_command(&["GET"]));
        assert_eq!(
            response.serialize(),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
    }

    #[test]
    fn test_with_config() {
        let config = ServerConfig {
            unknown_command: UnknownCommandPolicy::Error,
            error_replies: ErrorReplyStyle::Error,
            ..ServerConfig::default()
        };
        let handler = CommandHandler::with_config(Arc::new(StorageEngine::new()), &config);

        let response = handler.execute(&make_command(&["NOPE"]));
        assert_eq!(response, RespValue::error("ERR unknown command 'NOPE'"));
    }
}
