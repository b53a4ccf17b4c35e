//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// How a session's participant count evolves.
///
/// Joins have no matching leave, so the count can either be read as
/// "ever joined" or as "currently connected". Both readings are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticipantPolicy {
    /// Every join increments the count; nothing decrements it.
    #[default]
    Cumulative,
    /// The count is the number of distinct joined devices still present in
    /// the presence registry. Reaping a device removes it from every session
    /// it joined.
    Connected,
}

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Upper bound on the time spent serving one HTTP request.
    pub request_timeout: Duration,
    /// A device is active while its last heartbeat is younger than this.
    pub presence_ttl: Duration,
    /// Period of the presence reaper.
    pub reap_interval: Duration,
    /// Participant counting policy.
    pub participant_policy: ParticipantPolicy,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(10),
            presence_ttl: Duration::from_secs(30),
            reap_interval: Duration::from_secs(5),
            participant_policy: ParticipantPolicy::Cumulative,
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the presence TTL.
    pub fn with_presence_ttl(mut self, ttl: Duration) -> Self {
        self.presence_ttl = ttl;
        self
    }

    /// Sets the reaper period.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Sets the participant counting policy.
    pub fn with_participant_policy(mut self, policy: ParticipantPolicy) -> Self {
        self.participant_policy = policy;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3000)))
    }
}
