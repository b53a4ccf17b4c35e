//! # Codesync Client
//!
//! Polling sync client for codesync.
//!
//! This crate provides:
//! - Reconciliation engine (disconnected → idle ⇄ pulling, overlapping pushes)
//! - Edit coalescing with at most one outstanding push
//! - Local snapshot cache over a pluggable key/value store
//! - Transport abstraction with HTTP, loopback and mock implementations
//! - Timer-driven sync loop publishing an observable status
//!
//! ## Architecture
//!
//! There is no persistent connection. The client joins a session once, then:
//! 1. Polls the server on a fixed interval
//! 2. Pushes local edits as they happen
//! 3. Heartbeats so the server knows the device is alive
//!
//! ## Key Invariants
//!
//! - The server is authoritative; the cache is only a fallback
//! - A poll never reverts the user's own acknowledged or newer edit
//! - Transport failures flip the status offline and are never fatal
//! - Every network call is bounded by the request timeout

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod driver;
mod error;
mod http;
mod state;
mod transport;

pub use cache::{FileStore, KeyValueStore, LocalCache, LocalSnapshot, MemoryStore};
pub use config::ClientConfig;
pub use driver::{spawn, SyncHandle};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer, ReqwestClient};
pub use state::{EditOutcome, PollOutcome, SyncEngine, SyncState, SyncStats, SyncStatus};
pub use transport::{MockTransport, SyncTransport};
