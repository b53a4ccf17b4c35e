//! # Codesync Server
//!
//! Authoritative session store and presence registry for codesync.
//!
//! This crate provides:
//! - An in-memory session store with per-session locking
//! - A device presence registry with TTL-based reaping
//! - Request handling for the sync, presence and health endpoints
//! - A thin HTTP binding (axum)
//!
//! # Architecture
//!
//! The server keeps one [`SessionStore`] and one [`PresenceRegistry`] per
//! process, created with the [`SyncServer`] and dropped with it. Nothing is
//! persisted; horizontal scaling is out of scope.
//!
//! # Conflict model
//!
//! Writes are last-write-wins by arrival order. Concurrent edits within one
//! poll window may overwrite each other; the protocol only guarantees that
//! all clients converge on the same value.
//!
//! # Protocol
//!
//! - `GET /api/sync?sessionId=..` reads a session, creating it if unknown
//! - `POST /api/sync` with `{code, participantId}` replaces the body
//! - `PUT /api/sync` joins (increments the participant count)
//! - `POST /api/presence` with `{deviceId}` is a heartbeat
//! - `GET /api/presence` lists active devices

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
pub mod http;
mod presence;
mod server;
mod store;

pub use config::{ParticipantPolicy, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use presence::{Device, PresenceRegistry};
pub use server::SyncServer;
pub use store::{Session, SessionStore};
