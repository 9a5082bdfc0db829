//! Streamable HTTP transport for MCP.
//!
//! `POST /mcp` carries one JSON-RPC message. An `initialize` request without
//! an `Mcp-Session-Id` header opens a session: a [`ChannelTransport`] served
//! by its own [`McpServer::serve_session`] task, plus a router task that
//! hands each response to the POST waiting on its id and fans notifications
//! out to `GET /mcp` event streams. `DELETE /mcp` closes the session.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::get,
    Json, Router,
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mcp::codec::decode_frame;
use crate::mcp::protocol::*;
use crate::mcp::server::McpServer;
use crate::mcp::session::Session;
use crate::mcp::transport::{ChannelTransport, TransportEvent};

/// Header carrying the session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

const MAX_CONCURRENT_REQUESTS: usize = 256;
const EVENT_CAPACITY: usize = 256;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

type Pending = Arc<DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>;

/// One HTTP session and the channels into its server task.
struct HttpSession {
    id: String,
    inbound: mpsc::Sender<TransportEvent>,
    pending: Pending,
    events: broadcast::Sender<JsonRpcNotification>,
    shutdown: CancellationToken,
}

impl HttpSession {
    fn close(&self) {
        self.shutdown.cancel();
    }
}

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct HttpState {
    server: McpServer,
    sessions: Arc<DashMap<String, Arc<HttpSession>>>,
    shutdown: CancellationToken,
}

impl HttpState {
    pub fn new(server: McpServer, shutdown: CancellationToken) -> Self {
        Self {
            server,
            sessions: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, id: &str) -> Option<Arc<HttpSession>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    fn open_session(&self) -> Arc<HttpSession> {
        let (transport, inbound, mut outgoing) = ChannelTransport::pair();
        let session = Arc::new(Session::generate());
        let id = session.id().to_string();
        let shutdown = self.shutdown.child_token();
        let pending: Pending = Arc::new(DashMap::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = Arc::new(HttpSession {
            id: id.clone(),
            inbound,
            pending: pending.clone(),
            events: events.clone(),
            shutdown: shutdown.clone(),
        });
        self.sessions.insert(id.clone(), handle.clone());

        let server = self.server.clone();
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve_session(transport, session, shutdown).await {
                error!(session = %id, "HTTP session failed: {}", e);
            }
            sessions.remove(&id);
        });

        tokio::spawn(async move {
            while let Some(message) = outgoing.recv().await {
                match message {
                    Message::Response(response) => {
                        let waiter = response.id.as_ref().and_then(|id| pending.remove(id));
                        match waiter {
                            Some((_, tx)) => {
                                let _ = tx.send(response);
                            }
                            None => debug!("Dropping response nobody is waiting for"),
                        }
                    }
                    Message::Notification(notification) => {
                        let _ = events.send(notification);
                    }
                    Message::Request(request) => {
                        warn!("Server-initiated request '{}' is not routable over HTTP", request.method);
                    }
                }
            }
            // Session over: release every waiting POST.
            pending.clear();
        });

        info!(session = %handle.id, "HTTP session opened");
        handle
    }
}

/// Build the router for `state`.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/mcp", get(handle_sse).post(handle_post).delete(handle_delete))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([header::HeaderName::from_static(SESSION_HEADER)]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` fires.
pub async fn serve(listener: TcpListener, server: McpServer, shutdown: CancellationToken) -> Result<()> {
    let state = HttpState::new(server, shutdown.clone());
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::HttpServer(e.to_string()))
}

/// Bind the configured address and serve.
pub async fn start_server(config: &Config, server: McpServer, shutdown: CancellationToken) -> Result<()> {
    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::HttpServer(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Streamable HTTP transport listening on http://{}/mcp", addr);
    serve(listener, server, shutdown).await
}

fn rpc_error(status: StatusCode, id: Option<RequestId>, code: i32, message: impl Into<String>) -> Response {
    let body = JsonRpcResponse::error(id, JsonRpcError::new(code, message));
    (status, Json(body)).into_response()
}

fn with_session(mut response: Response, id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    let message = match std::str::from_utf8(&body) {
        Ok(text) => decode_frame(text),
        Err(_) => decode_frame(""),
    };
    let message = match message {
        Ok(message) => message,
        Err(frame) => return (StatusCode::BAD_REQUEST, Json(frame.to_response())).into_response(),
    };

    let (session, created) = match session_id(&headers) {
        Some(id) => match state.session(id) {
            Some(session) => (session, false),
            None => {
                return rpc_error(
                    StatusCode::NOT_FOUND,
                    request_id(&message),
                    error_codes::INVALID_REQUEST,
                    format!("Unknown session: {}", id),
                )
            }
        },
        None => {
            let is_initialize =
                matches!(&message, Message::Request(req) if req.method == methods::INITIALIZE);
            if !is_initialize {
                return rpc_error(
                    StatusCode::BAD_REQUEST,
                    request_id(&message),
                    error_codes::INVALID_REQUEST,
                    format!("Missing {} header", SESSION_HEADER),
                );
            }
            (state.open_session(), true)
        }
    };

    let response = match message {
        Message::Request(request) => {
            let (response, answered) = forward_request(&session, request).await;
            if created && !answered {
                state.sessions.remove(&session.id);
                session.close();
            }
            response
        }
        Message::Notification(notification) => {
            if notification.method == methods::NOTIFICATION_CANCELLED {
                release_cancelled(&session, &notification);
            }
            forward(&session, Message::Notification(notification)).await
        }
        other => forward(&session, other).await,
    };

    with_session(response, &session.id)
}

fn request_id(message: &Message) -> Option<RequestId> {
    match message {
        Message::Request(req) => Some(req.id.clone()),
        _ => None,
    }
}

async fn forward(session: &HttpSession, message: Message) -> Response {
    match session.inbound.send(TransportEvent::Message(message)).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Forward a request and wait for its response. The flag is true when the
/// server answered with a result rather than an error.
async fn forward_request(session: &HttpSession, request: JsonRpcRequest) -> (Response, bool) {
    let id = request.id.clone();
    let (tx, rx) = oneshot::channel();
    match session.pending.entry(id.clone()) {
        Entry::Occupied(_) => {
            let response = rpc_error(
                StatusCode::OK,
                Some(id.clone()),
                error_codes::INVALID_REQUEST,
                format!("Request id {} is already in flight", id),
            );
            return (response, false);
        }
        Entry::Vacant(slot) => {
            slot.insert(tx);
        }
    }

    if session
        .inbound
        .send(TransportEvent::Message(Message::Request(request)))
        .await
        .is_err()
    {
        session.pending.remove(&id);
        let response = rpc_error(StatusCode::NOT_FOUND, Some(id), error_codes::INVALID_REQUEST, "Session closed");
        return (response, false);
    }

    match rx.await {
        Ok(response) => {
            let answered = !response.is_error();
            (Json(response).into_response(), answered)
        }
        // Cancelled, or the session ended before answering.
        Err(_) => (StatusCode::NO_CONTENT.into_response(), false),
    }
}

/// Drop the waiter of a cancelled request so its POST returns.
fn release_cancelled(session: &HttpSession, notification: &JsonRpcNotification) {
    let params = notification
        .params
        .clone()
        .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
    if let Some(params) = params {
        session.pending.remove(&params.request_id);
    }
}

async fn handle_sse(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, format!("Missing {} header", SESSION_HEADER)).into_response();
    };
    let Some(session) = state.session(id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    with_session(event_stream(&session).into_response(), &session.id)
}

fn event_stream(session: &HttpSession) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(session.events.subscribe()).filter_map(|item| match item {
        Ok(notification) => match serde_json::to_string(&notification) {
            Ok(json) => Some(Ok(Event::default().event("message").data(json))),
            Err(e) => {
                error!("Failed to serialize notification: {}", e);
                None
            }
        },
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("keep-alive"))
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> StatusCode {
    let Some(id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    match state.sessions.remove(id) {
        Some((_, session)) => {
            session.close();
            info!(session = %id, "HTTP session closed by client");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "name": crate::SERVER_NAME,
        "version": crate::VERSION,
        "sessions": state.session_count(),
    }))
}

async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.server.dispatcher().metrics().to_prometheus(),
    )
}
