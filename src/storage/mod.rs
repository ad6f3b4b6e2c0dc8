//! Storage Module
//!
//! The process-wide key-value store. It is created once at startup, handed
//! to every connection as an `Arc<StorageEngine>`, and dropped at shutdown.
//!
//! ## Features
//!
//! - **Binary-safe**: keys and values are arbitrary bytes
//! - **Millisecond TTL**: `SET key value PX ms` attaches a deadline
//! - **Lazy Expiry**: expired keys are invisible on read and evicted then
//!
//! ## Example
//!
//! ```
//! use respkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//!
//! engine.set_with_ttl(Bytes::from("gone"), Bytes::from("x"), Duration::ZERO);
//! assert_eq!(engine.get(b"gone"), None);
//! ```

pub mod engine;

pub use engine::{Entry, StorageEngine, StorageStats};
