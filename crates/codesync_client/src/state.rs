//! Sync engine state machine.
//!
//! The engine owns three versions of the document:
//!
//! - the editable buffer, which local edits change immediately
//! - the local snapshot, the last state confirmed by the server
//! - the server's canonical state, fetched by polls and returned by pushes
//!
//! Reconciliation is last-write-wins. A pulled state replaces the buffer
//! only if it is newer than the snapshot and newer than the user's latest
//! unconfirmed edit; otherwise the buffer is kept and pushed again. Pulls
//! that land while a push is in flight are ignored: the push acknowledgement
//! becomes the new baseline and the next poll reconciles against it.

use crate::cache::{KeyValueStore, LocalCache, LocalSnapshot};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::SyncTransport;
use codesync_protocol::{
    Clock, HeartbeatRequest, JoinRequest, PresenceView, SessionView, SystemClock, UpdateRequest,
    DEFAULT_SESSION_ID,
};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No successful join yet for the current session.
    Disconnected,
    /// Joined, no poll in flight.
    Idle,
    /// Joined, a poll is in flight.
    Pulling,
}

impl SyncState {
    /// Returns true once the session has been joined.
    pub fn is_connected(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Pulling)
    }

    /// Returns true if a poll may start.
    pub fn can_poll(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

/// Observable sync status for the editing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// False after a failed call, true again after the next success.
    pub online: bool,
    /// Engine state.
    pub state: SyncState,
    /// Session being synced.
    pub session_id: String,
    /// Client time of the last successful exchange (Unix millis).
    pub last_sync: Option<u64>,
    /// Devices the server reported alive on the last heartbeat.
    pub active_devices: usize,
    /// Participant count from the last server response.
    pub participants: u64,
    /// True while a join, poll or push is outstanding.
    pub sync_in_progress: bool,
    /// Message of the last failed call, cleared on success.
    pub last_error: Option<String>,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Polls that reached the server.
    pub polls_completed: u64,
    /// Polled states that replaced the buffer.
    pub remote_updates_applied: u64,
    /// Pushes acknowledged by the server.
    pub pushes_completed: u64,
    /// Edits folded into an already scheduled push.
    pub edits_coalesced: u64,
    /// Failed joins, polls and pushes.
    pub failures: u64,
}

/// Result of a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The server has nothing newer.
    Unchanged,
    /// The buffer was replaced with the server's state.
    Updated,
    /// The buffer holds edits the server has not confirmed.
    NeedsPush,
    /// The server could not be reached; the buffer is untouched.
    Offline,
    /// Another poll or join was in flight, or a push was outstanding when
    /// the pull landed. Nothing was reconciled.
    Skipped,
}

/// What a local edit requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// No push is outstanding; the caller should run [`SyncEngine::flush`].
    PushNow,
    /// A push is outstanding; the edit replaced the payload of the next one.
    Coalesced,
    /// Not joined yet; the edit is pushed after the join.
    Deferred,
}

struct Inner {
    session_id: String,
    generation: u64,
    state: SyncState,
    joining: bool,
    buffer: String,
    snapshot: Option<LocalSnapshot>,
    dirty: bool,
    edited_at: u64,
    pending: Option<String>,
    push_in_flight: bool,
    online: bool,
    participants: u64,
    active_devices: usize,
    last_sync: Option<u64>,
    last_error: Option<String>,
}

impl Inner {
    fn new(session_id: String, snapshot: Option<LocalSnapshot>) -> Self {
        let buffer = snapshot
            .as_ref()
            .map(|s| s.code.clone())
            .unwrap_or_default();
        Self {
            session_id,
            generation: 0,
            state: SyncState::Disconnected,
            joining: false,
            buffer,
            snapshot,
            dirty: false,
            edited_at: 0,
            pending: None,
            push_in_flight: false,
            online: false,
            participants: 0,
            active_devices: 0,
            last_sync: None,
            last_error: None,
        }
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            online: self.online,
            state: self.state,
            session_id: self.session_id.clone(),
            last_sync: self.last_sync,
            active_devices: self.active_devices,
            participants: self.participants,
            sync_in_progress: self.joining
                || self.push_in_flight
                || self.state == SyncState::Pulling,
            last_error: self.last_error.clone(),
        }
    }

    fn mark_online(&mut self, now: u64) {
        if !self.online {
            info!(session_id = %self.session_id, "server reachable");
        }
        self.online = true;
        self.last_sync = Some(now);
        self.last_error = None;
    }

    fn mark_failed(&mut self, error: &ClientError) {
        if error.is_retryable() {
            if self.online {
                warn!(session_id = %self.session_id, %error, "server unreachable, serving local copy");
            }
            self.online = false;
        }
        self.last_error = Some(error.to_string());
    }

    fn known_timestamp(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.last_modified)
    }
}

/// The sync engine reconciles one session between this client and the server.
///
/// All methods take `&self`; share the engine behind an [`Arc`] between the
/// edit handler and the timer tasks. Every network call is bounded by the
/// configured request timeout, and no lock is held across one.
pub struct SyncEngine<T: SyncTransport, S: KeyValueStore> {
    config: ClientConfig,
    transport: T,
    cache: LocalCache<S>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    stats: RwLock<SyncStats>,
    status: watch::Sender<SyncStatus>,
    document: watch::Sender<String>,
}

impl<T: SyncTransport, S: KeyValueStore> SyncEngine<T, S> {
    /// Creates a new sync engine on the system clock.
    pub fn new(config: ClientConfig, transport: T, store: S) -> Self {
        Self::with_clock(config, transport, store, Arc::new(SystemClock))
    }

    /// Creates a sync engine with an explicit clock.
    ///
    /// The session is the configured one, else the one last joined on this
    /// store, else the default session. Its cached snapshot, if any, seeds
    /// the buffer so the document is readable before the first join.
    pub fn with_clock(
        config: ClientConfig,
        transport: T,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = LocalCache::new(store);
        let session_id = config
            .session_id
            .clone()
            .or_else(|| cache.current_session())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
        let inner = Inner::new(session_id.clone(), cache.read(&session_id));

        let (status, _) = watch::channel(inner.status());
        let (document, _) = watch::channel(inner.buffer.clone());

        Self {
            config,
            transport,
            cache,
            clock,
            inner: Mutex::new(inner),
            stats: RwLock::new(SyncStats::default()),
            status,
            document,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the local cache.
    pub fn cache(&self) -> &LocalCache<S> {
        &self.cache
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.inner.lock().state
    }

    /// Gets the current session id.
    pub fn session_id(&self) -> String {
        self.inner.lock().session_id.clone()
    }

    /// Gets the editable buffer.
    pub fn buffer(&self) -> String {
        self.inner.lock().buffer.clone()
    }

    /// Gets the last server-confirmed snapshot.
    pub fn snapshot(&self) -> Option<LocalSnapshot> {
        self.inner.lock().snapshot.clone()
    }

    /// Returns true if the buffer holds edits the server has not confirmed.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Gets the current status.
    pub fn status(&self) -> SyncStatus {
        self.inner.lock().status()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Subscribes to buffer replacements coming from the server or cache.
    ///
    /// Local edits are not echoed back.
    pub fn document(&self) -> watch::Receiver<String> {
        self.document.subscribe()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Joins the current session.
    ///
    /// The response seeds the snapshot and moves the engine to
    /// [`SyncState::Idle`]. On failure the engine stays disconnected, keeps
    /// serving the cached copy, and the next [`poll`](Self::poll) retries.
    /// Every call sends a join, and the server counts each one.
    pub async fn join(&self) -> ClientResult<SessionView> {
        self.join_session().await.map(|(view, _)| view)
    }

    async fn join_session(&self) -> ClientResult<(SessionView, PollOutcome)> {
        let (session_id, generation) = {
            let mut inner = self.inner.lock();
            inner.joining = true;
            self.publish(&inner);
            (inner.session_id.clone(), inner.generation)
        };

        let request = JoinRequest::new(self.config.participant_id.clone());
        let result = self.call(self.transport.join(&session_id, &request)).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(%session_id, "discarding join for a session no longer active");
            return Err(ClientError::NotJoined);
        }
        inner.joining = false;

        let outcome = match result {
            Ok(view) => {
                inner.state = SyncState::Idle;
                inner.mark_online(self.clock.now_millis());
                inner.participants = view.participants;
                let outcome = self.reconcile(&mut inner, &view);
                self.cache.set_current_session(&session_id);
                info!(%session_id, participants = view.participants, "joined session");
                Ok((view, outcome))
            }
            Err(e) => {
                inner.mark_failed(&e);
                self.stats.write().failures += 1;
                warn!(%session_id, error = %e, "join failed");
                Err(e)
            }
        };

        self.publish(&inner);
        outcome
    }

    /// Runs one poll tick.
    ///
    /// While disconnected the tick retries the join instead. Failures never
    /// touch the buffer; they only flip the status offline.
    pub async fn poll(&self) -> PollOutcome {
        let target = {
            let mut inner = self.inner.lock();
            if inner.joining || !(inner.state.can_poll() || inner.state == SyncState::Disconnected)
            {
                return PollOutcome::Skipped;
            }
            if inner.state == SyncState::Disconnected {
                None
            } else {
                inner.state = SyncState::Pulling;
                self.publish(&inner);
                Some((inner.session_id.clone(), inner.generation))
            }
        };

        let Some((session_id, generation)) = target else {
            return match self.join_session().await {
                Ok((_, outcome)) => outcome,
                Err(ClientError::NotJoined) => PollOutcome::Skipped,
                Err(_) => PollOutcome::Offline,
            };
        };

        let result = self.call(self.transport.get(&session_id)).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return PollOutcome::Skipped;
        }
        inner.state = SyncState::Idle;

        let outcome = match result {
            Ok(view) => {
                inner.mark_online(self.clock.now_millis());
                inner.participants = view.participants;
                let outcome = self.reconcile(&mut inner, &view);
                let mut stats = self.stats.write();
                stats.polls_completed += 1;
                if outcome == PollOutcome::Updated {
                    stats.remote_updates_applied += 1;
                }
                outcome
            }
            Err(e) => {
                inner.mark_failed(&e);
                self.stats.write().failures += 1;
                debug!(%session_id, error = %e, "poll failed");
                PollOutcome::Offline
            }
        };

        self.publish(&inner);
        outcome
    }

    /// Applies a local edit to the buffer.
    ///
    /// Never waits on the network. At most one push is outstanding: an edit
    /// made while one is in flight replaces the payload of the next push.
    pub fn edit(&self, code: impl Into<String>) -> EditOutcome {
        let code = code.into();
        let mut inner = self.inner.lock();
        inner.buffer = code.clone();
        inner.dirty = true;
        inner.edited_at = self.clock.now_millis();

        let outcome = if !inner.state.is_connected() {
            EditOutcome::Deferred
        } else if inner.push_in_flight {
            inner.pending = Some(code);
            self.stats.write().edits_coalesced += 1;
            EditOutcome::Coalesced
        } else {
            inner.pending = Some(code);
            inner.push_in_flight = true;
            EditOutcome::PushNow
        };

        self.publish(&inner);
        outcome
    }

    /// Schedules a push of the buffer if it is dirty and nothing is in flight.
    ///
    /// Returns true if the caller should run [`flush`](Self::flush).
    pub fn request_push(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.dirty || inner.push_in_flight || !inner.state.is_connected() {
            return false;
        }
        inner.pending = Some(inner.buffer.clone());
        inner.push_in_flight = true;
        self.publish(&inner);
        true
    }

    /// Sends scheduled pushes until none is pending.
    ///
    /// A failed push is not retried here: the buffer stays dirty and the
    /// next successful poll schedules it again. Returns the number of
    /// acknowledged pushes.
    pub async fn flush(&self) -> ClientResult<usize> {
        let mut pushed = 0;

        loop {
            let (session_id, generation, code) = {
                let mut inner = self.inner.lock();
                match inner.pending.take() {
                    Some(code) => {
                        inner.push_in_flight = true;
                        (inner.session_id.clone(), inner.generation, code)
                    }
                    None => {
                        inner.push_in_flight = false;
                        self.publish(&inner);
                        return Ok(pushed);
                    }
                }
            };

            let request = UpdateRequest::new(code, self.config.participant_id.clone());
            let result = self.call(self.transport.update(&session_id, &request)).await;

            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return Ok(pushed);
            }

            match result {
                Ok(view) => {
                    pushed += 1;
                    self.stats.write().pushes_completed += 1;
                    inner.mark_online(self.clock.now_millis());
                    inner.participants = view.participants;
                    self.adopt_snapshot(&mut inner, &view);

                    // Nothing typed meanwhile: the acknowledged state is the
                    // buffer's new value.
                    if inner.pending.is_none() {
                        inner.dirty = false;
                        if inner.buffer != view.code {
                            self.replace_buffer(&mut inner, &view.code);
                        }
                    }
                    debug!(%session_id, last_modified = view.last_modified, "push accepted");
                    self.publish(&inner);
                }
                Err(e) => {
                    inner.push_in_flight = false;
                    inner.pending = None;
                    inner.mark_failed(&e);
                    self.stats.write().failures += 1;
                    warn!(%session_id, error = %e, "push failed, will retry after next poll");
                    self.publish(&inner);
                    return Err(e);
                }
            }
        }
    }

    /// Sends a presence heartbeat and records the active device count.
    pub async fn heartbeat(&self) -> ClientResult<PresenceView> {
        let request = HeartbeatRequest::new(self.config.participant_id.clone());
        let result = self.call(self.transport.heartbeat(&request)).await;

        match &result {
            Ok(view) => {
                let mut inner = self.inner.lock();
                inner.active_devices = view.active_devices.len();
                self.publish(&inner);
            }
            Err(e) => debug!(error = %e, "heartbeat failed"),
        }
        result
    }

    /// Switches to another session.
    ///
    /// Results of calls still in flight for the previous session are
    /// discarded. The engine is disconnected until the next join.
    pub fn switch_session(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let snapshot = self.cache.read(&session_id);
        self.cache.set_current_session(&session_id);

        let mut inner = self.inner.lock();
        let mut next = Inner::new(session_id, snapshot);
        next.generation = inner.generation + 1;
        next.online = inner.online;
        next.active_devices = inner.active_devices;
        next.last_sync = inner.last_sync;
        *inner = next;

        info!(session_id = %inner.session_id, "switched session");
        self.document.send_replace(inner.buffer.clone());
        self.publish(&inner);
    }

    /// Creates a session with a fresh random id, makes it current and joins it.
    pub async fn create_session(&self) -> ClientResult<String> {
        let mut session_id = Uuid::new_v4().simple().to_string();
        session_id.truncate(8);

        self.switch_session(session_id.clone());
        self.join().await?;
        Ok(session_id)
    }

    /// Bounds a network call by the request timeout.
    async fn call<R>(&self, request: impl Future<Output = ClientResult<R>>) -> ClientResult<R> {
        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        }
    }

    fn reconcile(&self, inner: &mut Inner, view: &SessionView) -> PollOutcome {
        // The buffer may hold edits coalesced behind the outstanding push.
        if inner.push_in_flight {
            debug!(
                session_id = %inner.session_id,
                "push in flight, deferring reconciliation"
            );
            return PollOutcome::Skipped;
        }

        let newer = inner
            .known_timestamp()
            .map_or(true, |known| view.last_modified > known);

        if !newer {
            return if inner.dirty {
                PollOutcome::NeedsPush
            } else {
                PollOutcome::Unchanged
            };
        }

        self.adopt_snapshot(inner, view);

        // A session nobody has written to yet never overrides local edits.
        let pristine = view.code.is_empty() && view.last_updated_by.is_none();
        if inner.dirty && (pristine || inner.edited_at >= view.last_modified) {
            debug!(
                session_id = %inner.session_id,
                "keeping local edit newer than server state"
            );
            return PollOutcome::NeedsPush;
        }

        inner.dirty = false;
        inner.pending = None;
        if inner.buffer != view.code {
            self.replace_buffer(inner, &view.code);
        }
        PollOutcome::Updated
    }

    fn adopt_snapshot(&self, inner: &mut Inner, view: &SessionView) {
        let snapshot = LocalSnapshot::new(
            inner.session_id.clone(),
            view.code.clone(),
            view.last_modified,
        );
        self.cache.write(&snapshot);
        inner.snapshot = Some(snapshot);
    }

    fn replace_buffer(&self, inner: &mut Inner, code: &str) {
        inner.buffer = code.to_string();
        self.document.send_replace(inner.buffer.clone());
    }

    fn publish(&self, inner: &Inner) {
        self.status.send_replace(inner.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::transport::MockTransport;
    use codesync_protocol::ManualClock;
    use std::time::Duration;

    type TestEngine = SyncEngine<MockTransport, MemoryStore>;

    /// Delays updates around the moment the server applies them.
    struct SlowPush {
        server: MockTransport,
        before_apply: Duration,
        after_apply: Duration,
    }

    impl SyncTransport for SlowPush {
        async fn get(&self, session_id: &str) -> ClientResult<SessionView> {
            self.server.get(session_id).await
        }

        async fn update(
            &self,
            session_id: &str,
            request: &UpdateRequest,
        ) -> ClientResult<SessionView> {
            if !self.before_apply.is_zero() {
                tokio::time::sleep(self.before_apply).await;
            }
            let view = self.server.update(session_id, request).await?;
            tokio::time::sleep(self.after_apply).await;
            Ok(view)
        }

        async fn join(&self, session_id: &str, request: &JoinRequest) -> ClientResult<SessionView> {
            self.server.join(session_id, request).await
        }

        async fn heartbeat(&self, request: &HeartbeatRequest) -> ClientResult<PresenceView> {
            self.server.heartbeat(request).await
        }
    }

    fn slow_push_engine(
        before_apply: Duration,
        after_apply: Duration,
    ) -> (Arc<SyncEngine<SlowPush, MemoryStore>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = ClientConfig::new("memory://")
            .with_session("abc")
            .with_participant_id("me");
        let transport = SlowPush {
            server: MockTransport::new(clock.clone()),
            before_apply,
            after_apply,
        };
        let engine = SyncEngine::with_clock(config, transport, MemoryStore::new(), clock.clone());
        (Arc::new(engine), clock)
    }

    fn engine_with(store: MemoryStore) -> (Arc<TestEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = ClientConfig::new("memory://")
            .with_session("abc")
            .with_participant_id("me");
        let transport = MockTransport::new(clock.clone());
        let engine = SyncEngine::with_clock(config, transport, store, clock.clone());
        (Arc::new(engine), clock)
    }

    fn engine() -> (Arc<TestEngine>, Arc<ManualClock>) {
        engine_with(MemoryStore::new())
    }

    #[test]
    fn sync_state_checks() {
        assert!(!SyncState::Disconnected.is_connected());
        assert!(SyncState::Idle.is_connected());
        assert!(SyncState::Pulling.is_connected());
        assert!(SyncState::Idle.can_poll());
        assert!(!SyncState::Pulling.can_poll());
    }

    #[tokio::test]
    async fn join_seeds_snapshot() {
        let (engine, clock) = engine();
        engine.transport().remote_edit("abc", "hello", "other");
        clock.advance(10);

        let view = engine.join().await.unwrap();
        assert_eq!(view.participants, 1);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.buffer(), "hello");
        assert_eq!(engine.snapshot().unwrap().code, "hello");
        assert!(engine.status().online);
        assert_eq!(engine.cache().current_session().as_deref(), Some("abc"));
        assert_eq!(engine.stats().remote_updates_applied, 0);
    }

    #[tokio::test]
    async fn failed_join_serves_cached_copy_and_retries_on_poll() {
        let store = MemoryStore::new();
        let cached = serde_json::to_string(&LocalSnapshot::new("abc", "cached", 5)).unwrap();
        store.set("code_abc", &cached).unwrap();
        let (engine, _clock) = engine_with(store);
        engine.transport().set_reachable(false);

        assert!(engine.join().await.is_err());
        assert_eq!(engine.state(), SyncState::Disconnected);
        assert_eq!(engine.buffer(), "cached");
        assert!(!engine.status().online);

        engine.transport().set_reachable(true);
        assert_eq!(engine.poll().await, PollOutcome::Updated);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.transport().session("abc").unwrap().participants, 1);
    }

    #[tokio::test]
    async fn poll_applies_newer_remote_state() {
        let (engine, clock) = engine();
        engine.join().await.unwrap();
        assert_eq!(engine.poll().await, PollOutcome::Unchanged);

        clock.advance(100);
        engine.transport().remote_edit("abc", "remote", "other");

        let mut document = engine.document();
        assert_eq!(engine.poll().await, PollOutcome::Updated);
        assert_eq!(engine.buffer(), "remote");
        assert!(document.has_changed().unwrap());
        assert_eq!(*document.borrow_and_update(), "remote");
        assert_eq!(engine.stats().remote_updates_applied, 1);
    }

    #[tokio::test]
    async fn push_success_prevents_revert() {
        let (engine, clock) = engine();
        engine.join().await.unwrap();

        clock.advance(10);
        assert_eq!(engine.edit("mine"), EditOutcome::PushNow);
        assert_eq!(engine.flush().await.unwrap(), 1);
        assert!(!engine.is_dirty());

        // The pushed state is the snapshot, so the next poll sees nothing new.
        assert_eq!(engine.poll().await, PollOutcome::Unchanged);
        assert_eq!(engine.buffer(), "mine");
    }

    #[tokio::test]
    async fn pending_edit_survives_older_remote_write() {
        let (engine, clock) = engine();
        engine.join().await.unwrap();

        clock.advance(10);
        engine.transport().remote_edit("abc", "theirs", "other");
        clock.advance(10);
        engine.transport().set_reachable(false);
        engine.edit("mine");
        assert!(engine.flush().await.is_err());
        engine.transport().set_reachable(true);

        // The remote write is newer than the snapshot but older than the edit.
        assert_eq!(engine.poll().await, PollOutcome::NeedsPush);
        assert_eq!(engine.buffer(), "mine");
        assert!(engine.is_dirty());
    }

    #[tokio::test]
    async fn newer_remote_write_wins_over_pending_edit() {
        let (engine, clock) = engine();
        engine.join().await.unwrap();
        engine.transport().set_reachable(false);

        clock.advance(10);
        engine.edit("mine");
        assert!(engine.flush().await.is_err());

        clock.advance(10);
        engine.transport().set_reachable(true);
        engine.transport().remote_edit("abc", "theirs", "other");

        assert_eq!(engine.poll().await, PollOutcome::Updated);
        assert_eq!(engine.buffer(), "theirs");
        assert!(!engine.is_dirty());
    }

    #[tokio::test]
    async fn failed_push_is_repushed_after_next_poll() {
        let (engine, clock) = engine();
        engine.join().await.unwrap();
        engine.transport().set_reachable(false);

        clock.advance(10);
        assert_eq!(engine.edit("offline edit"), EditOutcome::PushNow);
        assert!(engine.flush().await.is_err());
        assert!(engine.is_dirty());
        assert!(!engine.status().online);

        assert_eq!(engine.poll().await, PollOutcome::Offline);
        assert_eq!(engine.buffer(), "offline edit");

        engine.transport().set_reachable(true);
        assert_eq!(engine.poll().await, PollOutcome::NeedsPush);
        assert!(engine.request_push());
        assert_eq!(engine.flush().await.unwrap(), 1);

        assert_eq!(engine.transport().session("abc").unwrap().code, "offline edit");
        assert!(engine.status().online);
    }

    #[tokio::test]
    async fn edits_before_join_are_deferred() {
        let (engine, clock) = engine();
        assert_eq!(engine.edit("early"), EditOutcome::Deferred);
        assert!(!engine.request_push());

        clock.advance(10);
        engine.join().await.unwrap();
        assert_eq!(engine.buffer(), "early");
        assert!(engine.request_push());
        engine.flush().await.unwrap();
        assert_eq!(engine.transport().pushes(), vec!["early"]);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_coalesce_while_push_in_flight() {
        let (engine, _clock) = engine();
        engine.join().await.unwrap();
        engine
            .transport()
            .set_latency(Duration::from_millis(100));

        assert_eq!(engine.edit("a"), EditOutcome::PushNow);
        let flushing = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.flush().await }
        });
        tokio::task::yield_now().await;

        assert_eq!(engine.edit("ab"), EditOutcome::Coalesced);
        assert_eq!(engine.edit("abc"), EditOutcome::Coalesced);
        assert!(engine.status().sync_in_progress);

        assert_eq!(flushing.await.unwrap().unwrap(), 2);
        assert_eq!(engine.transport().pushes(), vec!["a", "abc"]);
        assert_eq!(engine.stats().edits_coalesced, 2);
        assert!(!engine.status().sync_in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_during_push_keeps_coalesced_edit() {
        let (engine, clock) =
            slow_push_engine(Duration::ZERO, Duration::from_millis(100));
        engine.join().await.unwrap();

        clock.advance(10);
        assert_eq!(engine.edit("a"), EditOutcome::PushNow);
        let flushing = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.flush().await }
        });
        // "a" is applied on the server, its acknowledgement is still on the way.
        tokio::task::yield_now().await;
        assert_eq!(engine.edit("ab"), EditOutcome::Coalesced);

        assert_eq!(engine.poll().await, PollOutcome::Skipped);
        assert_eq!(engine.buffer(), "ab");
        assert!(engine.is_dirty());

        assert_eq!(flushing.await.unwrap().unwrap(), 2);
        assert_eq!(engine.transport().server.pushes(), vec!["a", "ab"]);
        assert_eq!(engine.transport().server.session("abc").unwrap().code, "ab");
        assert_eq!(engine.buffer(), "ab");
        assert!(!engine.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn push_landing_after_remote_write_converges() {
        let (engine, clock) =
            slow_push_engine(Duration::from_millis(50), Duration::from_millis(50));
        engine.join().await.unwrap();

        clock.advance(10);
        engine.edit("mine");
        let flushing = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.flush().await }
        });
        tokio::task::yield_now().await;

        clock.advance(10);
        engine.transport().server.remote_edit("abc", "theirs", "other");
        assert_eq!(engine.poll().await, PollOutcome::Skipped);
        assert_eq!(engine.buffer(), "mine");

        // "mine" lands after "theirs" and wins.
        assert_eq!(flushing.await.unwrap().unwrap(), 1);
        for _ in 0..3 {
            assert_eq!(engine.poll().await, PollOutcome::Unchanged);
        }
        let server = engine.transport().server.session("abc").unwrap();
        assert_eq!(server.code, "mine");
        assert_eq!(engine.buffer(), server.code);
        assert_eq!(engine.snapshot().unwrap().last_modified, server.last_modified);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_server_times_out() {
        let (engine, _clock) = engine();
        engine.join().await.unwrap();
        engine.transport().set_latency(Duration::from_secs(60));

        assert_eq!(engine.poll().await, PollOutcome::Offline);
        assert_eq!(engine.status().last_error.as_deref(), Some("request timed out"));
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn heartbeat_reports_devices() {
        let (engine, _clock) = engine();
        let presence = engine.heartbeat().await.unwrap();
        assert_eq!(presence.active_devices.len(), 1);
        assert_eq!(engine.status().active_devices, 1);
    }

    #[tokio::test]
    async fn create_session_switches_and_joins() {
        let (engine, _clock) = engine();
        engine.join().await.unwrap();

        let id = engine.create_session().await.unwrap();
        assert_eq!(id.len(), 8);
        assert_eq!(engine.session_id(), id);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.cache().current_session(), Some(id.clone()));
        assert_eq!(engine.transport().session(&id).unwrap().participants, 1);
    }

    #[tokio::test]
    async fn status_is_published() {
        let (engine, _clock) = engine();
        let mut status = engine.subscribe();
        assert_eq!(status.borrow_and_update().state, SyncState::Disconnected);

        engine.join().await.unwrap();
        assert!(status.has_changed().unwrap());
        let current = status.borrow_and_update().clone();
        assert_eq!(current.state, SyncState::Idle);
        assert_eq!(current.participants, 1);
        assert!(current.online);
    }
}
