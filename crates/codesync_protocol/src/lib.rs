//! # Codesync Protocol
//!
//! Wire types and JSON envelopes for the codesync polling protocol.
//!
//! This crate provides:
//! - [`SessionView`] for the canonical state of a shared document
//! - Request bodies for updates, joins and presence heartbeats
//! - The `{success, data, error}` [`Envelope`] every endpoint answers with
//! - Transport-neutral [`ApiRequest`] / [`ApiResponse`] shapes
//! - The [`Clock`] abstraction used for timestamps
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Sessions
//!
//! Requests that omit a session id address the shared session keyed
//! literally [`DEFAULT_SESSION_ID`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod messages;
mod request;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    DeviceView, Envelope, HealthView, HeartbeatRequest, JoinRequest, PresenceView, SessionView,
    UpdateRequest,
};
pub use request::{ApiRequest, ApiResponse, Method, Route, DEFAULT_SESSION_ID};
