//! Configuration for the sync client.

use std::time::Duration;
use uuid::Uuid;

/// Configuration for a sync client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL (e.g., "http://127.0.0.1:3000").
    pub server_url: String,
    /// Session to join. When unset, the client resumes the session it last
    /// joined, falling back to the shared default session.
    pub session_id: Option<String>,
    /// Identity sent with joins, edits and heartbeats.
    pub participant_id: String,
    /// Period between pulls of canonical state.
    pub poll_interval: Duration,
    /// Period between presence heartbeats.
    pub heartbeat_interval: Duration,
    /// Upper bound on every network call.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with a fresh random participant id.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_id: None,
            participant_id: Uuid::new_v4().to_string(),
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the session to join.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the participant id.
    pub fn with_participant_id(mut self, participant_id: impl Into<String>) -> Self {
        self.participant_id = participant_id.into();
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:3000")
    }
}
