//! # respkv - A Minimal RESP Key-Value Server
//!
//! respkv speaks the request/response subset of the Redis Serialization
//! Protocol that a basic client needs: `PING`, `ECHO`, `SET` (with an
//! optional `PX` millisecond expiry) and `GET`, over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               respkv                                 │
//! │                                                                      │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐               │
//! │  │   Server    │───>│ Connection  │───>│  Command    │               │
//! │  │ (JoinSet)   │    │  Handler    │    │  Handler    │               │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘               │
//! │                            │                  │                      │
//! │                     ┌──────▼──────┐    ┌──────▼─────────────────┐    │
//! │                     │ FrameReader │    │     StorageEngine      │    │
//! │                     │  + decode   │    │ RwLock<HashMap> + TTL  │    │
//! │                     └─────────────┘    └────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respkv::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING` - replies `PONG`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: request framing, decoding and reply encoding
//! - [`commands`]: dispatch and the four command handlers
//! - [`storage`]: the shared store with lazy expiry
//! - [`connection`]: the per-client session loop
//! - [`server`]: listener and connection supervision
//! - [`config`]: runtime options

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{ErrorReplyStyle, ServerConfig, UnknownCommandPolicy};
pub use connection::{handle_connection, ConnectionHandler, ConnectionStats};
pub use protocol::{Command, FrameError, FrameReader, RespValue};
pub use server::Server;
pub use storage::StorageEngine;

/// The default port respkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
