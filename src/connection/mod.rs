//! Connection Module
//!
//! Per-client session handling. Every accepted connection is served by
//! its own task running a [`ConnectionHandler`]; the only thing sessions
//! share is the store behind the [`CommandHandler`](crate::commands::CommandHandler).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Frame+decode│───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │         ▲                                     │             │
//! │         │                              ┌──────▼──────┐      │
//! │         └──────────────────────────────│ Send reply  │      │
//! │                                        └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, SessionState,
};
