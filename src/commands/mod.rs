//! Command Module
//!
//! The dispatch layer between the protocol and the store: it receives a
//! decoded [`Command`](crate::protocol::Command), validates it, executes it
//! against the [`StorageEngine`](crate::storage::StorageEngine), and returns
//! the reply to encode.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame/Decode   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::{CommandHandler, CommandKind};
