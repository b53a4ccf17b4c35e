//! Transport layer abstraction for sync operations.

use crate::error::{ClientError, ClientResult};
use codesync_protocol::{
    Clock, DeviceView, HeartbeatRequest, JoinRequest, PresenceView, SessionView, UpdateRequest,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A sync transport carries the four protocol calls to the server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing). Callers
/// bound every call with their own timeout.
pub trait SyncTransport: Send + Sync {
    /// Reads a session (GET).
    fn get(&self, session_id: &str) -> impl Future<Output = ClientResult<SessionView>> + Send;

    /// Replaces a session body (POST).
    fn update(
        &self,
        session_id: &str,
        request: &UpdateRequest,
    ) -> impl Future<Output = ClientResult<SessionView>> + Send;

    /// Joins a session (PUT).
    fn join(
        &self,
        session_id: &str,
        request: &JoinRequest,
    ) -> impl Future<Output = ClientResult<SessionView>> + Send;

    /// Sends a presence heartbeat.
    fn heartbeat(
        &self,
        request: &HeartbeatRequest,
    ) -> impl Future<Output = ClientResult<PresenceView>> + Send;
}

/// A mock transport for testing.
///
/// Behaves like a single in-memory server with last-write-wins sessions and
/// can be made unreachable or slow on demand.
pub struct MockTransport {
    clock: Arc<dyn Clock>,
    reachable: AtomicBool,
    latency_millis: AtomicU64,
    sessions: Mutex<HashMap<String, SessionView>>,
    devices: Mutex<BTreeMap<String, u64>>,
    pushes: Mutex<Vec<String>>,
    calls: AtomicU64,
}

impl MockTransport {
    /// Creates a reachable mock stamping writes with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            reachable: AtomicBool::new(true),
            latency_millis: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
            devices: Mutex::new(BTreeMap::new()),
            pushes: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Sets whether calls reach the mock server.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_millis
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Writes to a session as another client would.
    pub fn remote_edit(&self, session_id: &str, code: &str, editor: &str) -> SessionView {
        self.write(session_id, code, editor)
    }

    /// Returns the current server-side state of a session.
    pub fn session(&self, session_id: &str) -> Option<SessionView> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Returns the bodies of all updates received, in arrival order.
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().clone()
    }

    /// Returns the number of calls attempted.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_millis.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::transport_retryable("server unreachable"))
        }
    }

    fn write(&self, session_id: &str, code: &str, editor: &str) -> SessionView {
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionView::empty(now));

        session.code = code.to_string();
        session.last_modified = now.max(session.last_modified + 1);
        session.last_updated_by = Some(editor.to_string());
        session.clone()
    }
}

impl SyncTransport for MockTransport {
    async fn get(&self, session_id: &str) -> ClientResult<SessionView> {
        self.enter().await?;
        let now = self.clock.now_millis();
        Ok(self
            .sessions
            .lock()
            .entry(session_id.to_string())
            .or_insert_with(|| SessionView::empty(now))
            .clone())
    }

    async fn update(&self, session_id: &str, request: &UpdateRequest) -> ClientResult<SessionView> {
        self.enter().await?;
        let Some(code) = request.code.as_deref() else {
            return Err(ClientError::Validation("Code content is required".into()));
        };
        self.pushes.lock().push(code.to_string());

        let editor = request.participant_id.as_deref().unwrap_or("anonymous");
        Ok(self.write(session_id, code, editor))
    }

    async fn join(&self, session_id: &str, _request: &JoinRequest) -> ClientResult<SessionView> {
        self.enter().await?;
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionView::empty(now));
        session.participants += 1;
        Ok(session.clone())
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> ClientResult<PresenceView> {
        self.enter().await?;
        let now = self.clock.now_millis();
        let mut devices = self.devices.lock();
        devices.insert(request.device_id.clone(), now);

        Ok(PresenceView {
            active_devices: devices
                .iter()
                .map(|(id, last_heartbeat)| DeviceView {
                    id: id.clone(),
                    last_heartbeat: *last_heartbeat,
                })
                .collect(),
            ttl_millis: 30_000,
        })
    }
}
