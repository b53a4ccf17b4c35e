//! Main sync server.

use crate::config::{ParticipantPolicy, ServerConfig};
use crate::handler::{HandlerContext, RequestHandler};
use crate::presence::PresenceRegistry;
use crate::store::SessionStore;
use codesync_protocol::{ApiRequest, ApiResponse, Clock, SystemClock};
use std::sync::Arc;
use tracing::info;

/// The sync server.
///
/// Owns the session store and presence registry for the lifetime of the
/// process and dispatches protocol requests to them. Dropping the server
/// drops all session state; nothing is persisted.
///
/// # Example
///
/// ```
/// use codesync_protocol::{ApiRequest, Method, Route};
/// use codesync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.handle(&ApiRequest::new(Method::Put, Route::Sync).with_session("abc"));
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server on the system clock.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a sync server with an explicit clock.
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(SessionStore::new(
            config.participant_policy,
            Arc::clone(&clock),
        ));
        let presence = Arc::new(PresenceRegistry::new(
            config.presence_ttl,
            Arc::clone(&clock),
        ));
        let context = Arc::new(HandlerContext::new(config, store, presence, clock));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a protocol request.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self.handler.handle(request)
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.context.store
    }

    /// Returns the presence registry.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.context.presence
    }

    /// Runs one reaper tick: expires stale devices and, under the
    /// `Connected` policy, drops them from the sessions they joined.
    pub fn reap(&self) -> Vec<String> {
        let now = self.context.clock.now_millis();
        let removed = self.context.presence.reap(now);

        if !removed.is_empty() {
            let sessions = self.context.store.forget_devices(&removed);
            if self.context.config.participant_policy == ParticipantPolicy::Connected {
                info!(
                    devices = removed.len(),
                    sessions, "expired devices left their sessions"
                );
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_protocol::{ManualClock, Method, Route, SessionView, UpdateRequest};
    use std::time::Duration;

    fn session_of(response: &ApiResponse) -> SessionView {
        response.envelope().unwrap().into_result().unwrap()
    }

    #[test]
    fn server_lifecycle() {
        let server = SyncServer::new(ServerConfig::default());
        assert!(server.store().is_empty());
        assert!(server.presence().is_empty());
    }

    #[test]
    fn full_session_flow() {
        let clock = Arc::new(ManualClock::new(100));
        let server = SyncServer::with_clock(ServerConfig::default(), clock.clone());

        // 1. Join
        let join = ApiRequest::new(Method::Put, Route::Sync).with_session("abc");
        assert_eq!(session_of(&server.handle(&join)).participants, 1);

        // 2. Write x
        clock.advance(10);
        let post_x = ApiRequest::new(Method::Post, Route::Sync)
            .with_session("abc")
            .with_json(&UpdateRequest::new("x", "p1"))
            .unwrap();
        let t1 = session_of(&server.handle(&post_x)).last_modified;

        // 3. Read it back
        let get = ApiRequest::new(Method::Get, Route::Sync).with_session("abc");
        let session = session_of(&server.handle(&get));
        assert_eq!(session.code, "x");
        assert_eq!(session.participants, 1);

        // 4. Write y
        clock.advance(10);
        let post_y = ApiRequest::new(Method::Post, Route::Sync)
            .with_session("abc")
            .with_json(&UpdateRequest::new("y", "p1"))
            .unwrap();
        let t2 = session_of(&server.handle(&post_y)).last_modified;
        assert!(t2 > t1);

        assert_eq!(session_of(&server.handle(&get)).code, "y");
    }

    #[test]
    fn reap_expires_devices_and_decays_connected_sessions() {
        let clock = Arc::new(ManualClock::new(0));
        let config = ServerConfig::default()
            .with_presence_ttl(Duration::from_secs(30))
            .with_participant_policy(ParticipantPolicy::Connected);
        let server = SyncServer::with_clock(config, clock.clone());

        server.handler().handle_join("s", codesync_protocol::JoinRequest::new("d1"));
        server.presence().heartbeat("d2");
        assert_eq!(server.handler().handle_get("s").participants, 1);

        clock.advance(29_999);
        assert!(server.reap().is_empty());

        clock.advance(1);
        assert_eq!(server.reap(), vec!["d1", "d2"]);
        assert_eq!(server.handler().handle_get("s").participants, 0);
    }
}
