//! Serve command implementation.

use codesync_server::{http, ServerConfig, SyncServer};
use std::sync::Arc;
use tracing::info;

/// Runs the sync server until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        ttl_secs = config.presence_ttl.as_secs(),
        policy = ?config.participant_policy,
        "starting codesync server"
    );

    let server = Arc::new(SyncServer::new(config));
    http::serve(Arc::clone(&server)).await?;

    info!(sessions = server.store().len(), "discarding in-memory sessions");
    Ok(())
}
