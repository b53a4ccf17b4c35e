//! Integration tests for the sync client against an in-process server.

use codesync_client::{
    spawn, ClientConfig, ClientError, FileStore, HttpTransport, KeyValueStore, LoopbackClient,
    LoopbackServer, MemoryStore, PollOutcome, SyncEngine, SyncState, SyncTransport,
};
use codesync_protocol::{ApiRequest, ApiResponse, ManualClock, UpdateRequest};
use codesync_server::{ParticipantPolicy, ServerConfig, SyncServer};
use std::sync::Arc;
use std::time::Duration;

/// Routes loopback requests straight into the server's handler.
struct InProcess(Arc<SyncServer>);

impl LoopbackServer for InProcess {
    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self.0.handle(request)
    }
}

type Transport = HttpTransport<LoopbackClient<InProcess>>;

fn server_with(policy: ParticipantPolicy) -> (Arc<SyncServer>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let config = ServerConfig::default().with_participant_policy(policy);
    let server = Arc::new(SyncServer::with_clock(config, clock.clone()));
    (server, clock)
}

fn server() -> (Arc<SyncServer>, Arc<ManualClock>) {
    server_with(ParticipantPolicy::Cumulative)
}

fn client_with<S: KeyValueStore>(
    server: &Arc<SyncServer>,
    clock: &Arc<ManualClock>,
    config: ClientConfig,
    store: S,
) -> Arc<SyncEngine<Transport, S>> {
    let transport = HttpTransport::new(LoopbackClient::new(InProcess(Arc::clone(server))));
    Arc::new(SyncEngine::with_clock(
        config,
        transport,
        store,
        clock.clone(),
    ))
}

fn client(
    server: &Arc<SyncServer>,
    clock: &Arc<ManualClock>,
    session: &str,
    participant: &str,
) -> Arc<SyncEngine<Transport, MemoryStore>> {
    let config = ClientConfig::new("memory://")
        .with_session(session)
        .with_participant_id(participant);
    client_with(server, clock, config, MemoryStore::new())
}

fn set_reachable<S: KeyValueStore>(engine: &SyncEngine<Transport, S>, reachable: bool) {
    engine.transport().client().set_reachable(reachable);
}

#[tokio::test]
async fn two_clients_converge() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    let bob = client(&server, &clock, "abc", "bob");

    alice.join().await.unwrap();
    let joined = bob.join().await.unwrap();
    assert_eq!(joined.participants, 2);

    clock.advance(10);
    alice.edit("fn main() {}");
    alice.flush().await.unwrap();

    assert_eq!(bob.poll().await, PollOutcome::Updated);
    assert_eq!(bob.buffer(), "fn main() {}");
    assert_eq!(bob.status().participants, 2);

    clock.advance(10);
    bob.edit("fn main() { println!(); }");
    bob.flush().await.unwrap();

    assert_eq!(alice.poll().await, PollOutcome::Updated);
    assert_eq!(alice.buffer(), "fn main() { println!(); }");
}

#[tokio::test]
async fn own_edit_is_not_reverted_by_next_poll() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    alice.join().await.unwrap();

    clock.advance(10);
    alice.edit("mine");
    alice.flush().await.unwrap();

    assert_eq!(alice.poll().await, PollOutcome::Unchanged);
    assert_eq!(alice.buffer(), "mine");
    assert_eq!(server.handler().handle_get("abc").code, "mine");
}

#[tokio::test]
async fn last_write_wins_within_one_poll_window() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    let bob = client(&server, &clock, "abc", "bob");
    alice.join().await.unwrap();
    bob.join().await.unwrap();

    clock.advance(10);
    alice.edit("alice was here");
    bob.edit("bob was here");
    alice.flush().await.unwrap();
    bob.flush().await.unwrap();

    alice.poll().await;
    bob.poll().await;

    assert_eq!(alice.buffer(), "bob was here");
    assert_eq!(bob.buffer(), "bob was here");
    let session = server.handler().handle_get("abc");
    assert_eq!(session.last_updated_by.as_deref(), Some("bob"));
}

#[tokio::test]
async fn offline_client_keeps_serving_and_recovers() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    let bob = client(&server, &clock, "abc", "bob");
    alice.join().await.unwrap();
    bob.join().await.unwrap();

    clock.advance(10);
    alice.edit("before outage");
    alice.flush().await.unwrap();

    set_reachable(&alice, false);
    clock.advance(10);
    bob.edit("written during outage");
    bob.flush().await.unwrap();

    assert_eq!(alice.poll().await, PollOutcome::Offline);
    assert_eq!(alice.buffer(), "before outage");
    assert!(!alice.status().online);
    assert_eq!(alice.state(), SyncState::Idle);

    set_reachable(&alice, true);
    assert_eq!(alice.poll().await, PollOutcome::Updated);
    assert_eq!(alice.buffer(), "written during outage");
    assert!(alice.status().online);
}

#[tokio::test]
async fn offline_edit_reaches_server_after_recovery() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    alice.join().await.unwrap();

    set_reachable(&alice, false);
    clock.advance(10);
    alice.edit("typed offline");
    assert!(alice.flush().await.is_err());
    assert_eq!(server.handler().handle_get("abc").code, "");

    set_reachable(&alice, true);
    assert_eq!(alice.poll().await, PollOutcome::NeedsPush);
    assert!(alice.request_push());
    alice.flush().await.unwrap();

    assert_eq!(server.handler().handle_get("abc").code, "typed offline");
    assert!(!alice.is_dirty());
}

#[tokio::test]
async fn restarted_client_serves_cache_while_server_is_down() {
    let (server, clock) = server();
    let dir = tempfile::tempdir().unwrap();

    {
        let config = ClientConfig::new("memory://")
            .with_session("abc")
            .with_participant_id("alice");
        let alice = client_with(&server, &clock, config, FileStore::open(dir.path()).unwrap());
        alice.join().await.unwrap();
        clock.advance(10);
        alice.edit("persisted");
        alice.flush().await.unwrap();
    }

    // No session configured: the client resumes the one it last joined.
    let config = ClientConfig::new("memory://").with_participant_id("alice");
    let alice = client_with(&server, &clock, config, FileStore::open(dir.path()).unwrap());
    set_reachable(&alice, false);

    assert_eq!(alice.session_id(), "abc");
    assert!(alice.join().await.is_err());
    assert_eq!(alice.state(), SyncState::Disconnected);
    assert_eq!(alice.buffer(), "persisted");

    set_reachable(&alice, true);
    assert_eq!(alice.poll().await, PollOutcome::Unchanged);
    assert_eq!(alice.state(), SyncState::Idle);
}

#[tokio::test]
async fn rejected_write_leaves_no_trace() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    let before = alice.join().await.unwrap();

    let result = alice
        .transport()
        .update("abc", &UpdateRequest::default())
        .await;
    assert!(matches!(result, Err(ClientError::Validation(_))));

    let after = alice.transport().get("abc").await.unwrap();
    assert_eq!(after.code, before.code);
    assert_eq!(after.last_modified, before.last_modified);
}

#[tokio::test]
async fn default_session_is_shared_and_isolated() {
    let (server, clock) = server();
    let config = |id: &str| ClientConfig::new("memory://").with_participant_id(id);
    let alice = client_with(&server, &clock, config("alice"), MemoryStore::new());
    let bob = client_with(&server, &clock, config("bob"), MemoryStore::new());
    let carol = client(&server, &clock, "abc", "carol");

    assert_eq!(alice.session_id(), "default");
    alice.join().await.unwrap();
    bob.join().await.unwrap();
    carol.join().await.unwrap();

    clock.advance(10);
    alice.edit("shared");
    alice.flush().await.unwrap();

    assert_eq!(bob.poll().await, PollOutcome::Updated);
    assert_eq!(bob.buffer(), "shared");
    assert_eq!(carol.poll().await, PollOutcome::Unchanged);
    assert_eq!(carol.buffer(), "");
    assert_eq!(server.handler().handle_get("default").participants, 2);
}

#[tokio::test]
async fn connected_policy_counts_live_devices() {
    let (server, clock) = server_with(ParticipantPolicy::Connected);
    let alice = client(&server, &clock, "abc", "alice");
    let bob = client(&server, &clock, "abc", "bob");
    alice.join().await.unwrap();
    assert_eq!(bob.join().await.unwrap().participants, 2);

    clock.advance(20_000);
    alice.heartbeat().await.unwrap();

    clock.advance(15_000);
    assert_eq!(server.reap(), vec!["bob".to_string()]);

    alice.poll().await;
    assert_eq!(alice.status().participants, 1);
}

#[tokio::test(start_paused = true)]
async fn sync_loops_converge() {
    let (server, clock) = server();
    let alice = client(&server, &clock, "abc", "alice");
    let bob = client(&server, &clock, "abc", "bob");

    let alice_loop = spawn(Arc::clone(&alice));
    let bob_loop = spawn(Arc::clone(&bob));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(server.handler().handle_get("abc").participants, 2);

    clock.advance(10);
    alice_loop.edit("let x = 1;").unwrap();
    // Past the second heartbeat, so both devices have reported in.
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(bob.buffer(), "let x = 1;");
    assert_eq!(bob_loop.subscribe().borrow().active_devices, 2);

    alice_loop.shutdown().await;
    bob_loop.shutdown().await;
}
