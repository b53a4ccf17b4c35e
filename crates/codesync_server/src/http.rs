//! HTTP binding.
//!
//! Translates axum requests into [`ApiRequest`]s and back. All semantics
//! live in the request handler.

use crate::error::ServerResult;
use crate::server::SyncServer;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use codesync_protocol::{ApiRequest, ApiResponse, Method, Route};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

/// Builds the router for all endpoints.
pub fn router(server: Arc<SyncServer>) -> Router {
    let timeout = server.config().request_timeout;

    Router::new()
        .route(Route::Health.path(), any(dispatch))
        .route(Route::Sync.path(), any(dispatch))
        .route(Route::Presence.path(), any(dispatch))
        .layer(TimeoutLayer::new(timeout))
        // CORS for browser clients
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(server)
}

async fn dispatch(
    State(server): State<Arc<SyncServer>>,
    method: axum::http::Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let Some(route) = Route::from_path(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut request =
        ApiRequest::new(Method::parse(method.as_str()), route).with_body(body.to_vec());
    if let Some(session_id) = query.get("sessionId") {
        request = request.with_session(session_id.clone());
    }

    into_http(server.handle(&request))
}

fn into_http(response: ApiResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if response.body.is_empty() {
        return status.into_response();
    }
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
        .into_response()
}

/// Spawns the presence reaper on the server's reap interval.
pub fn spawn_reaper(server: Arc<SyncServer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(server.config().reap_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            server.reap();
        }
    })
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(server: Arc<SyncServer>) -> ServerResult<()> {
    let addr = server.config().bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "codesync server listening");

    let reaper = spawn_reaper(Arc::clone(&server));
    let result = axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    reaper.abort();

    info!("codesync server stopped");
    Ok(result?)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
