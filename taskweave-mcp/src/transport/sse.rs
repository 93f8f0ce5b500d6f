//! Streaming transport: HTTP POST in, Server-Sent Events out
//!
//! `GET /` opens a push stream backed by a bounded per-connection queue.
//! `POST /` (and the legacy `POST /message`) hands one envelope to the
//! protocol engine, answers it synchronously and also broadcasts the answer
//! to every live stream. Delivery to streams is best-effort: a full queue
//! drops that copy for that connection only.
//!
//! Each stream sends an `endpoint` event first, then waits on its queue for
//! at most `idle_timeout`. A timeout sends a `:keepalive` comment; after
//! `max_idle_periods` consecutive timeouts the connection is evicted.

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::protocol::{error_codes, JsonRpcResponse};
use crate::server::{expects_reply, parse_error, request_id, McpServer};
use crate::session::Session;
use crate::{Error, Result};

/// Header carrying the caller's session identity
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Path announced by the initial `endpoint` event
pub const ENDPOINT_PATH: &str = "/message";

#[derive(Debug, Clone)]
pub struct SseConfig {
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub max_idle_periods: u32,
    pub queue_capacity: usize,
    pub max_body_bytes: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            idle_timeout: Duration::from_secs(10),
            max_idle_periods: 3,
            queue_capacity: 256,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// One item written to a push stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Endpoint,
    Message(String),
    KeepAlive,
}

impl Outbound {
    pub fn into_event(self) -> Event {
        match self {
            Outbound::Endpoint => Event::default().event("endpoint").data(ENDPOINT_PATH),
            Outbound::Message(message) => Event::default().data(message),
            Outbound::KeepAlive => Event::default().comment("keepalive"),
        }
    }
}

struct ConnectionHandle {
    sender: mpsc::Sender<String>,
    alive: Arc<AtomicBool>,
}

impl ConnectionHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Live push streams and the protocol sessions keyed by the same ids
pub struct ConnectionManager {
    config: SseConfig,
    connections: Mutex<HashMap<String, ConnectionHandle>>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    legacy_session: Arc<Mutex<Session>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    pub fn new(config: SseConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
            sessions: DashMap::new(),
            legacy_session: Arc::new(Mutex::new(Session::new())),
        }
    }

    pub fn config(&self) -> &SseConfig {
        &self.config
    }

    /// Drop connections whose liveness flag has been cleared
    pub fn purge_stale(&self) -> usize {
        let mut connections = lock(&self.connections);
        let before = connections.len();
        connections.retain(|id, conn| {
            if !conn.is_alive() {
                debug!("Cleaning up stale connection: {}", id);
            }
            conn.is_alive()
        });
        before - connections.len()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.connections)
            .values()
            .filter(|c| c.is_alive())
            .count()
    }

    /// Admit a new push stream under `id`
    ///
    /// Stale entries are purged first. At the connection ceiling the stream
    /// is refused; callers are expected to retry. An existing stream with
    /// the same id is replaced and ends on its next wake.
    pub fn open(self: &Arc<Self>, id: String) -> Result<Connection> {
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let alive = Arc::new(AtomicBool::new(true));

        {
            let mut connections = lock(&self.connections);
            let before = connections.len();
            connections.retain(|_, conn| conn.is_alive());
            if before != connections.len() {
                debug!("Cleanup: {} -> {} connections", before, connections.len());
            }

            if connections.len() >= self.config.max_connections && !connections.contains_key(&id) {
                warn!(
                    "Connection limit reached: {}/{}",
                    connections.len(),
                    self.config.max_connections
                );
                return Err(Error::ConnectionLimit(connections.len()));
            }

            let handle = ConnectionHandle {
                sender,
                alive: Arc::clone(&alive),
            };
            if let Some(previous) = connections.insert(id.clone(), handle) {
                previous.alive.store(false, Ordering::SeqCst);
                debug!("Replaced existing stream for {}", id);
            }
            self.sessions.entry(id.clone()).or_default();
            info!(
                "SSE client connected: {} (total: {})",
                id,
                connections.len()
            );
        }

        Ok(Connection {
            id: id.clone(),
            receiver,
            guard: ConnectionGuard {
                manager: Arc::clone(self),
                id,
                alive,
            },
        })
    }

    /// Queue `message` on every live stream; returns how many accepted it
    pub fn broadcast(&self, message: &str) -> usize {
        let targets: Vec<(String, mpsc::Sender<String>, Arc<AtomicBool>)> =
            lock(&self.connections)
                .iter()
                .filter(|(_, conn)| conn.is_alive())
                .map(|(id, conn)| (id.clone(), conn.sender.clone(), Arc::clone(&conn.alive)))
                .collect();

        let mut delivered = 0;
        for (id, sender, alive) in targets {
            match sender.try_send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full for {}, dropping message", id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Stream {} already closed", id);
                    alive.store(false, Ordering::SeqCst);
                }
            }
        }
        delivered
    }

    /// Session for a caller
    ///
    /// Only ids with an open stream own a session. Header-less callers and
    /// ids without a stream share the legacy session.
    pub fn session(&self, id: Option<&str>) -> Arc<Mutex<Session>> {
        if let Some(id) = id {
            if let Some(session) = self.sessions.get(id) {
                return Arc::clone(session.value());
            }
            debug!("No open stream for session {}, using the shared session", id);
        }
        Arc::clone(&self.legacy_session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn release(&self, id: &str, alive: &Arc<AtomicBool>) {
        alive.store(false, Ordering::SeqCst);
        let mut connections = lock(&self.connections);
        let owned = connections
            .get(id)
            .is_some_and(|conn| Arc::ptr_eq(&conn.alive, alive));
        if owned {
            connections.remove(id);
            self.sessions.remove(id);
        }
        info!(
            "SSE client disconnected: {} (total: {})",
            id,
            connections.len()
        );
    }
}

/// Clears the liveness flag and unregisters the stream when dropped
struct ConnectionGuard {
    manager: Arc<ConnectionManager>,
    id: String,
    alive: Arc<AtomicBool>,
}

impl ConnectionGuard {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.release(&self.id, &self.alive);
    }
}

/// An admitted push stream that has not started yet
pub struct Connection {
    id: String,
    receiver: mpsc::Receiver<String>,
    guard: ConnectionGuard,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Outbound items for this connection; ends on eviction or replacement
    pub fn into_stream(self) -> impl Stream<Item = Outbound> + Send + 'static {
        let Connection {
            id,
            mut receiver,
            guard,
        } = self;
        let idle_timeout = guard.manager.config.idle_timeout;
        let max_idle_periods = guard.manager.config.max_idle_periods;

        async_stream::stream! {
            yield Outbound::Endpoint;

            let mut idle_periods = 0;
            while guard.is_alive() {
                match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                    Ok(Some(message)) => {
                        idle_periods = 0;
                        yield Outbound::Message(message);
                        while let Ok(message) = receiver.try_recv() {
                            yield Outbound::Message(message);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        idle_periods += 1;
                        if idle_periods >= max_idle_periods {
                            info!("Connection idle timeout, closing: {}", id);
                            break;
                        }
                        yield Outbound::KeepAlive;
                    }
                }
            }

            debug!("SSE stream ended for: {}", id);
            drop(guard);
        }
    }
}

fn derive_connection_id(remote: Option<SocketAddr>) -> String {
    let remote = remote
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "local".to_string());
    format!(
        "{}-{}-{:08x}",
        remote,
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct SseState {
    server: Arc<McpServer>,
    connections: Arc<ConnectionManager>,
}

impl SseState {
    pub fn new(server: Arc<McpServer>, config: SseConfig) -> Self {
        Self {
            server,
            connections: Arc::new(ConnectionManager::new(config)),
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }
}

async fn open_stream(
    State(state): State<SseState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let accepts_events = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));
    if !accepts_events {
        return (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({"error": "text/event-stream required in Accept header"})),
        )
            .into_response();
    }

    let id = session_header(&headers)
        .map(str::to_string)
        .unwrap_or_else(|| derive_connection_id(connect_info.map(|ConnectInfo(addr)| addr)));

    let connection = match state.connections.open(id) {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Refusing SSE stream: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable: Too many connections",
            )
                .into_response();
        }
    };

    let session_id = HeaderValue::from_str(connection.id()).ok();
    let events = connection
        .into_stream()
        .map(|item| Ok::<Event, Infallible>(item.into_event()));

    let mut response = Sse::new(events).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    if let Some(session_id) = session_id {
        response_headers.insert(HeaderName::from_static(SESSION_HEADER), session_id);
    }
    response
}

async fn post_message(State(state): State<SseState>, headers: HeaderMap, body: String) -> Response {
    let message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse posted message: {}", e);
            return (StatusCode::BAD_REQUEST, Json(parse_error(e))).into_response();
        }
    };

    let slot = state.connections.session(session_header(&headers));
    let before = lock(&slot).clone();
    let mut session = before.clone();
    let response = state.server.handle(&mut session, &message).await;
    if session != before {
        *lock(&slot) = session;
    }

    if !expects_reply(&message) {
        return StatusCode::ACCEPTED.into_response();
    }

    let encoded = match serde_json::to_string(&response) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("Failed to encode response: {}", e);
            let error = JsonRpcResponse::error(
                request_id(&message),
                error_codes::INTERNAL_ERROR,
                format!("Internal error: {}", e),
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response();
        }
    };

    let delivered = state.connections.broadcast(&encoded);
    debug!("Broadcast response to {} streams", delivered);

    ([(header::CONTENT_TYPE, "application/json")], encoded).into_response()
}

async fn health(State(state): State<SseState>) -> Json<Value> {
    let purged = state.connections.purge_stale();
    if purged > 0 {
        debug!("Health check purged {} stale connections", purged);
    }
    Json(json!({
        "status": "ok",
        "connections": state.connections.live_count(),
    }))
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// HTTP routes for the streaming transport
pub fn router(state: SseState) -> Router {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::CACHE_CONTROL,
            session_header.clone(),
            HeaderName::from_static("last-event-id"),
        ])
        .expose_headers([session_header])
        .allow_origin(HeaderValue::from_static("*"));

    let max_body_bytes = state.connections.config().max_body_bytes;

    Router::new()
        .route("/", get(open_stream).post(post_message).options(preflight))
        .route(ENDPOINT_PATH, post(post_message).options(preflight))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `address` and serve until the listener fails
pub async fn serve(server: Arc<McpServer>, address: &str, config: SseConfig) -> Result<()> {
    let app = router(SseState::new(server, config));

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("MCP endpoint: http://{}/", address);
    info!("Legacy endpoint: http://{}{}", address, ENDPOINT_PATH);
    info!("Health check: http://{}/health", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| Error::Transport(format!("Server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manager(config: SseConfig) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(config))
    }

    #[tokio::test]
    async fn test_connection_cap_and_release() {
        let manager = manager(SseConfig {
            max_connections: 2,
            ..Default::default()
        });

        let first = manager.open("a".to_string()).unwrap();
        let _second = manager.open("b".to_string()).unwrap();
        assert_matches!(
            manager.open("c".to_string()),
            Err(Error::ConnectionLimit(2))
        );

        drop(first);
        assert_eq!(manager.live_count(), 1);
        assert!(manager.open("c".to_string()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_gets_keepalives_then_evicted() {
        let manager = manager(SseConfig::default());
        let mut stream = Box::pin(manager.open("idle".to_string()).unwrap().into_stream());

        assert_eq!(stream.next().await, Some(Outbound::Endpoint));
        assert_eq!(stream.next().await, Some(Outbound::KeepAlive));
        assert_eq!(stream.next().await, Some(Outbound::KeepAlive));
        assert_eq!(stream.next().await, None);
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_resets_idle_counter() {
        let manager = manager(SseConfig::default());
        let mut stream = Box::pin(manager.open("busy".to_string()).unwrap().into_stream());
        assert_eq!(stream.next().await, Some(Outbound::Endpoint));

        assert_eq!(stream.next().await, Some(Outbound::KeepAlive));
        assert_eq!(stream.next().await, Some(Outbound::KeepAlive));
        manager.broadcast("ping");
        assert_eq!(stream.next().await, Some(Outbound::Message("ping".to_string())));

        assert_eq!(stream.next().await, Some(Outbound::KeepAlive));
        assert_eq!(stream.next().await, Some(Outbound::KeepAlive));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_broadcast_is_fifo_per_connection() {
        let manager = manager(SseConfig::default());
        let mut stream = Box::pin(manager.open("fifo".to_string()).unwrap().into_stream());

        assert_eq!(manager.broadcast("1"), 1);
        assert_eq!(manager.broadcast("2"), 1);

        assert_eq!(stream.next().await, Some(Outbound::Endpoint));
        assert_eq!(stream.next().await, Some(Outbound::Message("1".to_string())));
        assert_eq!(stream.next().await, Some(Outbound::Message("2".to_string())));
    }

    #[tokio::test]
    async fn test_full_queue_drops_copy() {
        let manager = manager(SseConfig {
            queue_capacity: 1,
            ..Default::default()
        });
        let _connection = manager.open("slow".to_string()).unwrap();

        assert_eq!(manager.broadcast("first"), 1);
        assert_eq!(manager.broadcast("second"), 0);
    }

    #[tokio::test]
    async fn test_reconnect_with_same_id_replaces_stream() {
        let manager = manager(SseConfig::default());
        let old = manager.open("same".to_string()).unwrap();
        let mut new_stream = Box::pin(manager.open("same".to_string()).unwrap().into_stream());

        // the replaced stream ends immediately and must not unregister the new one
        let mut old_stream = Box::pin(old.into_stream());
        assert_eq!(old_stream.next().await, Some(Outbound::Endpoint));
        assert_eq!(old_stream.next().await, None);
        drop(old_stream);

        assert_eq!(manager.live_count(), 1);
        manager.broadcast("hello");
        assert_eq!(new_stream.next().await, Some(Outbound::Endpoint));
        assert_eq!(
            new_stream.next().await,
            Some(Outbound::Message("hello".to_string()))
        );
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_by_open_stream() {
        let manager = manager(SseConfig::default());
        let a = manager.open("a".to_string()).unwrap();
        let _b = manager.open("b".to_string()).unwrap();
        lock(&manager.session(Some("a"))).initialize(None, None);

        assert!(lock(&manager.session(Some("a"))).is_initialized());
        assert!(!lock(&manager.session(Some("b"))).is_initialized());
        assert!(!lock(&manager.session(None)).is_initialized());
        assert_eq!(manager.session_count(), 2);

        drop(a);
        assert_eq!(manager.session_count(), 1);
        assert!(!lock(&manager.session(Some("a"))).is_initialized());
    }

    #[test]
    fn test_unknown_session_ids_share_legacy_session() {
        let manager = ConnectionManager::new(SseConfig::default());
        let legacy = manager.session(None);

        for i in 0..10_000 {
            let session = manager.session(Some(&format!("s{}", i)));
            assert!(Arc::ptr_eq(&session, &legacy));
        }
        assert_eq!(manager.session_count(), 0);
    }
}
