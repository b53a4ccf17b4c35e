//! HTTP transport implementation.
//!
//! [`HttpTransport`] speaks the JSON envelope protocol over any
//! [`HttpClient`]. Two clients are provided: [`ReqwestClient`] for real
//! servers and [`LoopbackClient`], which hands requests straight to an
//! in-process handler.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::SyncTransport;
use codesync_protocol::{
    ApiRequest, ApiResponse, HeartbeatRequest, JoinRequest, Method, PresenceView, Route,
    SessionView, UpdateRequest,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// HTTP client abstraction.
///
/// Implement this trait to carry protocol requests over a different
/// HTTP library or an in-process channel.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the raw response.
    fn send(&self, request: ApiRequest) -> impl Future<Output = ClientResult<ApiResponse>> + Send;
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C) -> Self {
        Self {
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn exchange<Req, Res>(
        &self,
        method: Method,
        route: Route,
        session_id: Option<&str>,
        body: Option<&Req>,
    ) -> ClientResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let mut request = ApiRequest::new(method, route);
        if let Some(session_id) = session_id {
            request = request.with_session(session_id);
        }
        if let Some(body) = body {
            request = request.with_json(body)?;
        }

        let result = match self.client.send(request).await {
            Ok(response) => decode(&response),
            Err(e) => Err(e),
        };

        *self.last_error.write() = result.as_ref().err().map(ToString::to_string);
        result
    }
}

/// Maps a response onto its payload or a typed error.
fn decode<T: DeserializeOwned>(response: &ApiResponse) -> ClientResult<T> {
    if response.is_success() {
        return response
            .envelope::<T>()?
            .into_result()
            .map_err(ClientError::Codec);
    }

    let message = response
        .envelope::<serde_json::Value>()
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| format!("status {}", response.status));
    Err(match response.status {
        405 => ClientError::MethodNotAllowed(message),
        400..=499 => ClientError::Validation(message),
        _ => ClientError::ServerRejected(message),
    })
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn get(&self, session_id: &str) -> ClientResult<SessionView> {
        self.exchange::<(), _>(Method::Get, Route::Sync, Some(session_id), None)
            .await
    }

    async fn update(&self, session_id: &str, request: &UpdateRequest) -> ClientResult<SessionView> {
        self.exchange(Method::Post, Route::Sync, Some(session_id), Some(request))
            .await
    }

    async fn join(&self, session_id: &str, request: &JoinRequest) -> ClientResult<SessionView> {
        self.exchange(Method::Put, Route::Sync, Some(session_id), Some(request))
            .await
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> ClientResult<PresenceView> {
        self.exchange(Method::Post, Route::Presence, None, Some(request))
            .await
    }
}

impl HttpTransport<ReqwestClient> {
    /// Creates a transport for the configured server URL.
    pub fn connect(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self::new(ReqwestClient::new(config)?))
    }
}

/// An [`HttpClient`] backed by `reqwest`.
pub struct ReqwestClient {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client for the configured server.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::transport_fatal(e.to_string()))?;

        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl HttpClient for ReqwestClient {
    async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ClientError::transport_fatal(e.to_string()))?;
        let url = format!("{}{}", self.base_url, request.route.path());

        let mut builder = self.client.request(method, url);
        if let Some(session_id) = &request.session_id {
            builder = builder.query(&[("sessionId", session_id)]);
        }
        if !request.body.is_empty() {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(request.body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(ApiResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else if err.is_builder() {
        ClientError::transport_fatal(err.to_string())
    } else {
        ClientError::transport_retryable(err.to_string())
    }
}

/// Trait for servers that can handle loopback requests.
///
/// Implemented for any `Fn(&ApiRequest) -> ApiResponse`, so an in-process
/// server is wired up with a closure.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request.
    fn handle(&self, request: &ApiRequest) -> ApiResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(&ApiRequest) -> ApiResponse + Send + Sync,
{
    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self(request)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead. It can be switched
/// unreachable to simulate an outage.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    reachable: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            reachable: AtomicBool::new(true),
        }
    }

    /// Sets whether requests reach the server.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ClientError::transport_retryable("connection refused"));
        }
        Ok(self.server.handle(&request))
    }
}
