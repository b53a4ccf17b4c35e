//! Watch command implementation.

use codesync_client::{
    spawn, ClientConfig, FileStore, HttpTransport, KeyValueStore, MemoryStore, ReqwestClient,
    SyncEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Follows a session until Ctrl-C, printing the document on every change.
pub async fn run(
    config: ClientConfig,
    cache_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::connect(&config)?;
    match cache_dir {
        Some(dir) => follow(SyncEngine::new(config, transport, FileStore::open(dir)?)).await,
        None => follow(SyncEngine::new(config, transport, MemoryStore::new())).await,
    }
}

async fn follow<S: KeyValueStore + 'static>(
    engine: SyncEngine<HttpTransport<ReqwestClient>, S>,
) -> Result<(), Box<dyn std::error::Error>> {
    let handle = spawn(Arc::new(engine));
    let mut document = handle.document();
    let mut status = handle.subscribe();
    let mut online = status.borrow_and_update().online;

    let cached = document.borrow_and_update().clone();
    if !cached.is_empty() {
        println!("{cached}");
    }

    loop {
        tokio::select! {
            changed = document.changed() => {
                if changed.is_err() {
                    break;
                }
                let code = document.borrow_and_update().clone();
                println!("--- {} ---", handle.engine().session_id());
                println!("{code}");
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.online != online {
                    online = current.online;
                    if online {
                        info!(participants = current.participants, "online");
                    } else {
                        warn!(error = ?current.last_error, "offline, showing last known code");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}
