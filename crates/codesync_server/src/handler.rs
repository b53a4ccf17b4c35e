//! Request handlers for sync endpoints.

use crate::config::{ParticipantPolicy, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::presence::PresenceRegistry;
use crate::store::SessionStore;
use codesync_protocol::{
    ApiRequest, ApiResponse, Clock, Envelope, HealthView, HeartbeatRequest, JoinRequest, Method,
    PresenceView, ProtocolError, Route, SessionView, UpdateRequest,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Session store (shared across all handlers).
    pub store: Arc<SessionStore>,
    /// Presence registry (shared across all handlers).
    pub presence: Arc<PresenceRegistry>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        store: Arc<SessionStore>,
        presence: Arc<PresenceRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            presence,
            clock,
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a request. Errors are folded into a `{success:false}` body
    /// with the matching status code.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    warn!(route = ?request.route, error = %err, "request failed");
                } else {
                    debug!(route = ?request.route, error = %err, "request rejected");
                }
                error_response(&err)
            }
        }
    }

    fn dispatch(&self, request: &ApiRequest) -> ServerResult<ApiResponse> {
        if request.method == Method::Options {
            return Ok(ApiResponse::empty(200));
        }

        match (request.route, &request.method) {
            (Route::Sync, Method::Get) => ok(self.handle_get(request.session_id())),
            (Route::Sync, Method::Post) => {
                let update = parse_update(request)?;
                ok(self.handle_update(request.session_id(), update)?)
            }
            (Route::Sync, Method::Put) => {
                let join = parse_optional::<JoinRequest>(request)?;
                ok(self.handle_join(request.session_id(), join))
            }
            (Route::Presence, Method::Get) => ok(self.handle_presence()),
            (Route::Presence, Method::Post) => {
                let heartbeat: HeartbeatRequest = request.json()?;
                ok(self.handle_heartbeat(heartbeat)?)
            }
            (Route::Health, Method::Get) => ok(self.handle_health()),
            (_, method) => Err(ServerError::MethodNotAllowed(method.to_string())),
        }
    }

    /// Returns the session, creating it on first reference.
    pub fn handle_get(&self, session_id: &str) -> SessionView {
        self.context.store.get_or_create(session_id).to_view()
    }

    /// Replaces the session body.
    pub fn handle_update(
        &self,
        session_id: &str,
        request: UpdateRequest,
    ) -> ServerResult<SessionView> {
        let code = request
            .code
            .ok_or_else(|| ServerError::Validation("Code content is required".into()))?;

        let session = self
            .context
            .store
            .apply_update(session_id, code, request.participant_id);
        Ok(session.to_view())
    }

    /// Registers a join. Anonymous joins get a fresh device id, so each of
    /// them counts as a distinct participant.
    pub fn handle_join(&self, session_id: &str, request: JoinRequest) -> SessionView {
        let device_id = request
            .participant_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if self.context.store.policy() == ParticipantPolicy::Connected {
            self.context.presence.heartbeat(&device_id);
        }

        self.context.store.join(session_id, &device_id).to_view()
    }

    /// Records a device heartbeat and returns the live device set.
    pub fn handle_heartbeat(&self, request: HeartbeatRequest) -> ServerResult<PresenceView> {
        if request.device_id.is_empty() {
            return Err(ServerError::Validation("Device id is required".into()));
        }
        self.context.presence.heartbeat(&request.device_id);
        Ok(self.context.presence.snapshot())
    }

    /// Returns the live device set.
    pub fn handle_presence(&self) -> PresenceView {
        self.context.presence.snapshot()
    }

    /// Returns the service status.
    pub fn handle_health(&self) -> HealthView {
        let mut sync = BTreeMap::new();
        sync.insert("GET".into(), "Get current code for session".into());
        sync.insert("POST".into(), "Update code for session".into());
        sync.insert("PUT".into(), "Join session".into());

        let mut presence = BTreeMap::new();
        presence.insert("GET".into(), "List active devices".into());
        presence.insert("POST".into(), "Device heartbeat".into());

        let mut endpoints = BTreeMap::new();
        endpoints.insert(Route::Sync.path().to_string(), sync);
        endpoints.insert(Route::Presence.path().to_string(), presence);

        HealthView {
            message: "Code Sync API is running".into(),
            endpoints,
            timestamp: self.context.clock.now_millis(),
        }
    }
}

/// A POST without a body is a missing `code`, not a malformed request.
fn parse_update(request: &ApiRequest) -> ServerResult<UpdateRequest> {
    match request.json::<UpdateRequest>() {
        Ok(update) => Ok(update),
        Err(ProtocolError::MissingBody) => Ok(UpdateRequest::default()),
        Err(err) => Err(err.into()),
    }
}

fn parse_optional<T: serde::de::DeserializeOwned + Default>(
    request: &ApiRequest,
) -> ServerResult<T> {
    if !request.has_body() {
        return Ok(T::default());
    }
    Ok(request.json()?)
}

fn ok<T: serde::Serialize>(data: T) -> ServerResult<ApiResponse> {
    ApiResponse::json(200, &Envelope::success(data))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

fn error_response(err: &ServerError) -> ApiResponse {
    let envelope: Envelope<()> = Envelope::error(err.to_string());
    ApiResponse::json(err.status_code(), &envelope)
        .unwrap_or_else(|_| ApiResponse::empty(err.status_code()))
}
