//! MCP server implementation.
//!
//! [`McpServer::serve`] runs one session over one transport. The read pump
//! only decodes and routes: `initialize` is answered inline so that later
//! requests observe the negotiated state, every other request runs as its
//! own task, and responses go back through the transport's single writer.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::handler::RequestContext;
use crate::mcp::progress::ProgressToken;
use crate::mcp::protocol::*;
use crate::mcp::registry::Registry;
use crate::mcp::session::Session;
use crate::mcp::transport::{Outbound, Transport, TransportEvent};

/// How long in-flight requests may keep running after the peer hangs up.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type InFlight = Arc<DashMap<RequestId, CancellationToken>>;

/// MCP server.
#[derive(Debug, Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    /// Create a new MCP server around a configured dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Create a server for `registry` with this crate's name and version.
    pub fn from_registry(registry: Registry) -> Self {
        Self::new(Dispatcher::new(
            Arc::new(registry),
            ServerInfo {
                name: crate::SERVER_NAME.to_string(),
                version: crate::VERSION.to_string(),
            },
        ))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run one session until the peer disconnects.
    pub async fn serve<T: Transport>(&self, transport: T) -> Result<()> {
        self.serve_with_shutdown(transport, CancellationToken::new())
            .await
    }

    /// Run one session until the peer disconnects or `shutdown` fires.
    pub async fn serve_with_shutdown<T: Transport>(
        &self,
        transport: T,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.serve_session(transport, Arc::new(Session::generate()), shutdown)
            .await
    }

    /// Run `session` over `transport`.
    pub async fn serve_session<T: Transport>(
        &self,
        mut transport: T,
        session: Arc<Session>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (mut events, outbound) = transport.start().await?;
        session.attach().await;
        let metrics = self.dispatcher.metrics().clone();
        metrics.session_opened();
        info!(session = session.id(), "MCP session started");

        let in_flight: InFlight = Arc::new(DashMap::new());
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut drain = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(session = session.id(), "Shutdown requested");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(session = session.id(), "Request task panicked: {}", e);
                        }
                    }
                }
                event = events.recv() => match event {
                    None | Some(TransportEvent::Closed) => {
                        info!(session = session.id(), "Peer closed the connection");
                        drain = true;
                        break;
                    }
                    Some(TransportEvent::Error(e)) => {
                        error!(session = session.id(), "Transport failed: {}", e);
                        break;
                    }
                    Some(TransportEvent::Malformed(frame)) => {
                        metrics.inc_malformed();
                        warn!(session = session.id(), "Malformed frame: {}", frame.error.message);
                        if outbound.send(frame.to_response()).await.is_err() {
                            break;
                        }
                    }
                    Some(TransportEvent::Message(Message::Request(req))) => {
                        if let Err(e) = self
                            .on_request(req, &session, &outbound, &in_flight, &shutdown, &mut tasks)
                            .await
                        {
                            error!(session = session.id(), "Failed to send response: {}", e);
                            break;
                        }
                    }
                    Some(TransportEvent::Message(Message::Notification(notif))) => {
                        self.on_notification(notif, &session, &in_flight).await;
                    }
                    Some(TransportEvent::Message(Message::Response(res))) => {
                        warn!(session = session.id(), id = ?res.id, "Ignoring unexpected response");
                    }
                },
            }
        }

        if drain && !tasks.is_empty() {
            debug!(session = session.id(), pending = tasks.len(), "Draining in-flight requests");
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
        }

        // Completions still pending are discarded.
        session.close().await;
        for entry in in_flight.iter() {
            entry.value().cancel();
        }
        tasks.shutdown().await;
        drop(outbound);
        metrics.session_closed();

        transport.close().await?;
        info!(session = session.id(), "MCP session ended");
        Ok(())
    }

    async fn on_request(
        &self,
        req: JsonRpcRequest,
        session: &Arc<Session>,
        outbound: &Outbound,
        in_flight: &InFlight,
        shutdown: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> Result<()> {
        let id = req.id.clone();

        if req.method == methods::INITIALIZE {
            let ctx = RequestContext::new(id);
            if let Some(response) = self.dispatcher.dispatch(session, req, &ctx).await {
                outbound.send(response).await?;
            }
            return Ok(());
        }

        if in_flight.contains_key(&id) {
            let err = Error::InvalidRequest(format!("Request id {} is already in flight", id));
            return outbound
                .send(JsonRpcResponse::error(Some(id), JsonRpcError::from(&err)))
                .await;
        }

        let token = shutdown.child_token();
        in_flight.insert(id.clone(), token.clone());
        let ctx = RequestContext::new(id.clone())
            .with_cancellation(token)
            .with_progress_token(ProgressToken::from_params(req.params.as_ref()))
            .with_outbound(outbound.clone());

        let dispatcher = self.dispatcher.clone();
        let session = session.clone();
        let outbound = outbound.clone();
        let in_flight = in_flight.clone();
        tasks.spawn(async move {
            let response = dispatcher.dispatch(&session, req, &ctx).await;
            in_flight.remove(&id);
            let Some(response) = response else {
                return;
            };
            if session.is_closed().await {
                debug!(%id, "Session closed; discarding response");
                return;
            }
            if outbound.send(response).await.is_err() {
                debug!(%id, "Transport gone; discarding response");
            }
        });
        Ok(())
    }

    async fn on_notification(
        &self,
        notif: JsonRpcNotification,
        session: &Session,
        in_flight: &InFlight,
    ) {
        if session.negotiated().await.is_none() {
            warn!(
                session = session.id(),
                method = %notif.method,
                "Dropping notification received before initialize"
            );
            return;
        }

        match notif.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                session.mark_initialized().await;
            }
            methods::NOTIFICATION_CANCELLED => {
                let params = notif
                    .params
                    .map(serde_json::from_value::<CancelledParams>);
                match params {
                    Some(Ok(params)) => match in_flight.remove(&params.request_id) {
                        Some((id, token)) => {
                            info!(
                                session = session.id(),
                                %id,
                                reason = params.reason.as_deref().unwrap_or(""),
                                "Cancelling request"
                            );
                            token.cancel();
                        }
                        None => debug!(id = %params.request_id, "Cancel for unknown or finished request"),
                    },
                    _ => warn!(session = session.id(), "Malformed cancellation notification"),
                }
            }
            other => {
                debug!(session = session.id(), method = other, "Ignoring notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::{success_result, ToolHandler};
    use crate::mcp::transport::ChannelTransport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "slow".to_string(),
                description: "Sleeps".to_string(),
                input_schema: json!({"type": "object", "properties": {"ms": {"type": "integer"}}}),
            }
        }

        async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(success_result(format!("slept {}", ms)))
        }
    }

    fn server() -> McpServer {
        let mut registry = Registry::new();
        registry.register_tool(SlowTool).unwrap();
        McpServer::from_registry(registry)
    }

    fn msg(value: Value) -> TransportEvent {
        TransportEvent::Message(crate::mcp::codec::parse_message(value).unwrap())
    }

    async fn next_response(rx: &mut mpsc::Receiver<Message>) -> JsonRpcResponse {
        loop {
            match rx.recv().await.expect("server hung up") {
                Message::Response(res) => return res,
                _ => continue,
            }
        }
    }

    async fn initialize(tx: &mpsc::Sender<TransportEvent>, rx: &mut mpsc::Receiver<Message>) {
        tx.send(msg(json!({
            "jsonrpc": "2.0", "id": 0, "method": "initialize",
            "params": {"protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": {"name": "t", "version": "1"}}
        })))
        .await
        .unwrap();
        assert!(!next_response(rx).await.is_error());
        tx.send(msg(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_out_of_order_completion() {
        let (transport, tx, mut rx) = ChannelTransport::pair();
        let server = server();
        let handle = tokio::spawn(async move { server.serve(transport).await });

        initialize(&tx, &mut rx).await;
        tx.send(msg(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": {"name": "slow", "arguments": {"ms": 300}}})))
            .await
            .unwrap();
        tx.send(msg(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "slow", "arguments": {"ms": 0}}})))
            .await
            .unwrap();

        assert_eq!(next_response(&mut rx).await.id, Some(RequestId::Number(2)));
        assert_eq!(next_response(&mut rx).await.id, Some(RequestId::Number(1)));

        tx.send(TransportEvent::Closed).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_suppresses_response() {
        let (transport, tx, mut rx) = ChannelTransport::pair();
        let server = server();
        let handle = tokio::spawn(async move { server.serve(transport).await });

        initialize(&tx, &mut rx).await;
        tx.send(msg(json!({"jsonrpc": "2.0", "id": "long", "method": "tools/call",
            "params": {"name": "slow", "arguments": {"ms": 60000}}})))
            .await
            .unwrap();
        tx.send(msg(json!({"jsonrpc": "2.0", "method": "notifications/cancelled",
            "params": {"requestId": "long", "reason": "user abort"}})))
            .await
            .unwrap();
        tx.send(msg(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"})))
            .await
            .unwrap();

        // Only the ping is answered.
        assert_eq!(next_response(&mut rx).await.id, Some(RequestId::Number(3)));
        tx.send(TransportEvent::Closed).await.unwrap();
        handle.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_answered_and_session_continues() {
        let (transport, tx, mut rx) = ChannelTransport::pair();
        let server = server();
        let handle = tokio::spawn(async move { server.serve(transport).await });

        let frame = crate::mcp::codec::decode_frame("{not json").unwrap_err();
        tx.send(TransportEvent::Malformed(frame)).await.unwrap();
        let res = next_response(&mut rx).await;
        assert_eq!(res.error.unwrap().code, error_codes::PARSE_ERROR);
        assert_eq!(res.id, None);

        initialize(&tx, &mut rx).await;
        tx.send(TransportEvent::Closed).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_rejected() {
        let (transport, tx, mut rx) = ChannelTransport::pair();
        let server = server();
        let handle = tokio::spawn(async move { server.serve(transport).await });

        initialize(&tx, &mut rx).await;
        let call = json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "slow", "arguments": {"ms": 200}}});
        tx.send(msg(call.clone())).await.unwrap();
        tx.send(msg(call)).await.unwrap();

        let first = next_response(&mut rx).await;
        assert_eq!(first.error.unwrap().code, error_codes::INVALID_REQUEST);
        let second = next_response(&mut rx).await;
        assert!(!second.is_error());

        tx.send(TransportEvent::Closed).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_discards_in_flight() {
        let (transport, tx, mut rx) = ChannelTransport::pair();
        let server = server();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve_with_shutdown(transport, token).await });

        initialize(&tx, &mut rx).await;
        tx.send(msg(json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call",
            "params": {"name": "slow", "arguments": {"ms": 60000}}})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        handle.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }
}
