//! Timer-driven sync loop.
//!
//! One task owns the poll and heartbeat timers and the command channel. Every
//! network call runs in its own short-lived task, so a slow server never
//! delays edit handling; the engine itself keeps at most one push and one
//! poll outstanding.

use crate::cache::KeyValueStore;
use crate::error::{ClientError, ClientResult};
use crate::state::{EditOutcome, PollOutcome, SyncEngine, SyncStatus};
use crate::transport::SyncTransport;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::debug;

enum Command {
    Edit(String),
    SyncNow,
}

/// Handle to a running sync loop.
pub struct SyncHandle<T: SyncTransport, S: KeyValueStore> {
    engine: Arc<SyncEngine<T, S>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl<T, S> SyncHandle<T, S>
where
    T: SyncTransport + 'static,
    S: KeyValueStore + 'static,
{
    /// Returns the engine driven by this loop.
    pub fn engine(&self) -> &Arc<SyncEngine<T, S>> {
        &self.engine
    }

    /// Submits a local edit. Returns immediately.
    pub fn edit(&self, code: impl Into<String>) -> ClientResult<()> {
        self.send(Command::Edit(code.into()))
    }

    /// Polls now instead of waiting for the next tick.
    pub fn sync_now(&self) -> ClientResult<()> {
        self.send(Command::SyncNow)
    }

    fn send(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::transport_fatal("sync loop stopped"))
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.engine.subscribe()
    }

    /// Subscribes to buffer replacements from the server.
    pub fn document(&self) -> watch::Receiver<String> {
        self.engine.document()
    }

    /// Stops the loop after in-flight calls finish or time out.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            debug!(error = %e, "sync loop ended abnormally");
        }
    }
}

/// Starts the sync loop for `engine`.
///
/// The first poll tick fires immediately and joins the session; polls and
/// pushes start once the join succeeds.
pub fn spawn<T, S>(engine: Arc<SyncEngine<T, S>>) -> SyncHandle<T, S>
where
    T: SyncTransport + 'static,
    S: KeyValueStore + 'static,
{
    let (commands, receiver) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(Arc::clone(&engine), receiver));
    SyncHandle {
        engine,
        commands,
        task,
    }
}

async fn run<T, S>(
    engine: Arc<SyncEngine<T, S>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    T: SyncTransport + 'static,
    S: KeyValueStore + 'static,
{
    let mut poll = tokio::time::interval(engine.config().poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat = tokio::time::interval(engine.config().heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut calls = JoinSet::new();

    loop {
        tokio::select! {
            _ = poll.tick() => spawn_poll(&mut calls, &engine),
            _ = heartbeat.tick() => {
                let engine = Arc::clone(&engine);
                calls.spawn(async move {
                    // Failures only lower the device count the next time.
                    let _ = engine.heartbeat().await;
                });
            }
            command = commands.recv() => match command {
                Some(Command::Edit(code)) => {
                    if engine.edit(code) == EditOutcome::PushNow {
                        let engine = Arc::clone(&engine);
                        calls.spawn(async move { push(&engine).await });
                    }
                }
                Some(Command::SyncNow) => {
                    spawn_poll(&mut calls, &engine);
                    poll.reset();
                }
                None => break,
            },
            Some(_) = calls.join_next() => {}
        }
    }

    while calls.join_next().await.is_some() {}
    debug!(session_id = %engine.session_id(), "sync loop stopped");
}

fn spawn_poll<T, S>(calls: &mut JoinSet<()>, engine: &Arc<SyncEngine<T, S>>)
where
    T: SyncTransport + 'static,
    S: KeyValueStore + 'static,
{
    let engine = Arc::clone(engine);
    calls.spawn(async move {
        if engine.poll().await == PollOutcome::NeedsPush && engine.request_push() {
            push(&engine).await;
        }
    });
}

async fn push<T: SyncTransport, S: KeyValueStore>(engine: &SyncEngine<T, S>) {
    // The engine records the failure; the next poll schedules a retry.
    if let Ok(count) = engine.flush().await {
        debug!(count, "flushed edits");
    }
}
