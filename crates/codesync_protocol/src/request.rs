//! Transport-neutral request and response shapes.
//!
//! The server handler consumes [`ApiRequest`] and produces [`ApiResponse`];
//! the HTTP binding and the loopback transport only translate to and from
//! these types.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::Envelope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Session addressed by requests that do not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Request verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read.
    Get,
    /// Update.
    Post,
    /// Join.
    Put,
    /// Preflight.
    Options,
    /// Anything else, kept verbatim for error messages.
    Other(String),
}

impl Method {
    /// Parses a verb, case-insensitively.
    pub fn parse(verb: &str) -> Self {
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }

    /// Returns the verb as an uppercase string.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Options => "OPTIONS",
            Method::Other(verb) => verb,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint addressed by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Service status (`/api`).
    Health,
    /// Session document (`/api/sync`).
    Sync,
    /// Device presence (`/api/presence`).
    Presence,
}

impl Route {
    /// Resolves a URL path, ignoring a trailing slash.
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/api" => Some(Route::Health),
            "/api/sync" => Some(Route::Sync),
            "/api/presence" => Some(Route::Presence),
            _ => None,
        }
    }

    /// Returns the URL path of the endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            Route::Health => "/api",
            Route::Sync => "/api/sync",
            Route::Presence => "/api/presence",
        }
    }
}

/// A request to one of the endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Verb.
    pub method: Method,
    /// Endpoint.
    pub route: Route,
    /// Value of the `sessionId` query parameter, if sent.
    pub session_id: Option<String>,
    /// Raw JSON body; empty when none was sent.
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Creates a request without session id or body.
    pub fn new(method: Method, route: Route) -> Self {
        Self {
            method,
            route,
            session_id: None,
            body: Vec::new(),
        }
    }

    /// Sets the `sessionId` query parameter.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets a raw body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> ProtocolResult<Self> {
        self.body = serde_json::to_vec(body)?;
        Ok(self)
    }

    /// Returns the addressed session, falling back to [`DEFAULT_SESSION_ID`]
    /// when the parameter is absent or empty.
    pub fn session_id(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_SESSION_ID)
    }

    /// Returns true if a non-blank body was sent.
    pub fn has_body(&self) -> bool {
        !self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Parses the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        if !self.has_body() {
            return Err(ProtocolError::MissingBody);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A response from one of the endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Raw JSON body; empty for preflight responses.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response without a body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json<T: Serialize>(status: u16, body: &T) -> ProtocolResult<Self> {
        Ok(Self {
            status,
            body: serde_json::to_vec(body)?,
        })
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as an envelope.
    pub fn envelope<T: DeserializeOwned>(&self) -> ProtocolResult<Envelope<T>> {
        if self.body.is_empty() {
            return Err(ProtocolError::MissingBody);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}
