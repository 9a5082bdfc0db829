//! Request dispatch.
//!
//! Routes one request to its handler and turns the outcome into exactly one
//! response carrying the request's id. Protocol problems (unknown method,
//! undeclared capability, bad params, schema violations) become JSON-RPC
//! errors; failures inside a tool handler, panics included, become tool
//! results with `isError: true`.

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::mcp::handler::{error_result, RequestContext};
use crate::mcp::prompts::{GetPromptParams, GetPromptResult, ListPromptsResult};
use crate::mcp::protocol::{
    methods, CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PaginatedParams, ServerCapabilities, ServerInfo,
};
use crate::mcp::registry::Registry;
use crate::mcp::resources::{
    ListResourceTemplatesResult, ListResourcesResult, ReadResourceParams, ReadResourceResult,
};
use crate::mcp::session::Session;
use crate::mcp::validation::validate_arguments;
use crate::metrics::{Metrics, Timer};

/// The protocol methods this server knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpMethod {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesTemplatesList,
    ResourcesRead,
    ResourcesSubscribe,
    ResourcesUnsubscribe,
    PromptsList,
    PromptsGet,
    LoggingSetLevel,
    Unknown(String),
}

/// Capability families a method can be gated behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Tools,
    Resources,
    ResourceSubscriptions,
    Prompts,
    Logging,
}

impl McpMethod {
    pub fn parse(method: &str) -> Self {
        match method {
            methods::INITIALIZE => Self::Initialize,
            methods::PING => Self::Ping,
            methods::TOOLS_LIST => Self::ToolsList,
            methods::TOOLS_CALL => Self::ToolsCall,
            methods::RESOURCES_LIST => Self::ResourcesList,
            methods::RESOURCES_TEMPLATES_LIST => Self::ResourcesTemplatesList,
            methods::RESOURCES_READ => Self::ResourcesRead,
            methods::RESOURCES_SUBSCRIBE => Self::ResourcesSubscribe,
            methods::RESOURCES_UNSUBSCRIBE => Self::ResourcesUnsubscribe,
            methods::PROMPTS_LIST => Self::PromptsList,
            methods::PROMPTS_GET => Self::PromptsGet,
            methods::LOGGING_SET_LEVEL => Self::LoggingSetLevel,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The capability this method requires, if any.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::ToolsList | Self::ToolsCall => Some(Capability::Tools),
            Self::ResourcesList | Self::ResourcesTemplatesList | Self::ResourcesRead => {
                Some(Capability::Resources)
            }
            Self::ResourcesSubscribe | Self::ResourcesUnsubscribe => {
                Some(Capability::ResourceSubscriptions)
            }
            Self::PromptsList | Self::PromptsGet => Some(Capability::Prompts),
            Self::LoggingSetLevel => Some(Capability::Logging),
            Self::Initialize | Self::Ping | Self::Unknown(_) => None,
        }
    }
}

impl Capability {
    /// Whether the declared capabilities cover this family.
    pub fn is_served_by(self, caps: &ServerCapabilities) -> bool {
        match self {
            Self::Tools => caps.tools.is_some(),
            Self::Resources => caps.resources.is_some(),
            Self::ResourceSubscriptions => caps.resources.as_ref().is_some_and(|r| r.subscribe),
            Self::Prompts => caps.prompts.is_some(),
            Self::Logging => caps.logging.is_some(),
        }
    }
}

/// Deserialize request params, treating absent params as `{}`.
fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = match params {
        None | Some(Value::Null) => json!({}),
        Some(p) => p,
    };
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Routes requests for one server; shared by all of its sessions.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
    instructions: Option<String>,
    request_timeout: Option<Duration>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, server_info: ServerInfo) -> Self {
        let capabilities = registry.server_capabilities();
        Self {
            registry,
            capabilities,
            server_info,
            instructions: None,
            request_timeout: None,
            metrics: Metrics::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Bound every request; `None` disables the limit.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle one request. Returns `None` only when the request was cancelled
    /// by the host, which must not be answered.
    pub async fn dispatch(
        &self,
        session: &Session,
        request: JsonRpcRequest,
        ctx: &RequestContext,
    ) -> Option<JsonRpcResponse> {
        let timer = Timer::start();
        self.metrics.inc_requests();
        let id = request.id.clone();
        let method = request.method.clone();
        debug!(session = session.id(), %id, method = %method, "Dispatching request");

        let work = AssertUnwindSafe(self.route(session, request, ctx)).catch_unwind();
        let guarded = async {
            match self.request_timeout {
                Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| limit),
                None => Ok(work.await),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                self.metrics.inc_cancellations();
                debug!(%id, method = %method, "Request cancelled; no response sent");
                return None;
            }
            outcome = guarded => outcome,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                error!(%id, method = %method, "Handler panicked: {}", panic_message(&*panic));
                Err(Error::Internal(format!("Handler for '{}' failed unexpectedly", method)))
            }
            Err(limit) => {
                self.metrics.inc_timeouts();
                warn!(%id, method = %method, "Request timed out");
                Err(Error::Timeout {
                    seconds: limit.as_secs(),
                })
            }
        };
        self.metrics.observe_latency(&timer);

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                self.metrics.inc_failed();
                if e.is_client_error() {
                    debug!(%id, method = %method, "Request rejected: {}", e);
                } else {
                    warn!(%id, method = %method, "Request failed: {}", e);
                }
                JsonRpcResponse::error(Some(id), JsonRpcError::from(&e))
            }
        })
    }

    async fn route(
        &self,
        session: &Session,
        request: JsonRpcRequest,
        ctx: &RequestContext,
    ) -> Result<Value> {
        session.check_request(&request.method).await?;

        let method = McpMethod::parse(&request.method);
        if let McpMethod::Unknown(name) = &method {
            return Err(Error::MethodNotFound(name.clone()));
        }
        if let Some(capability) = method.capability() {
            if !capability.is_served_by(&self.capabilities) {
                return Err(Error::MethodNotFound(format!(
                    "{} (capability not offered)",
                    request.method
                )));
            }
        }

        let params = request.params;
        match method {
            McpMethod::Initialize => self.initialize(session, params).await,
            McpMethod::Ping => Ok(json!({})),
            McpMethod::ToolsList => {
                let _: PaginatedParams = parse_params(params)?;
                Ok(serde_json::to_value(ListToolsResult {
                    tools: self.registry.list_tools(),
                    next_cursor: None,
                })?)
            }
            McpMethod::ToolsCall => self.call_tool(params, ctx).await,
            McpMethod::ResourcesList => {
                let _: PaginatedParams = parse_params(params)?;
                Ok(serde_json::to_value(ListResourcesResult {
                    resources: self.registry.list_resources(),
                    next_cursor: None,
                })?)
            }
            McpMethod::ResourcesTemplatesList => {
                let _: PaginatedParams = parse_params(params)?;
                Ok(serde_json::to_value(ListResourceTemplatesResult {
                    resource_templates: self.registry.list_resource_templates(),
                    next_cursor: None,
                })?)
            }
            McpMethod::ResourcesRead => self.read_resource(params).await,
            McpMethod::PromptsList => {
                let _: PaginatedParams = parse_params(params)?;
                Ok(serde_json::to_value(ListPromptsResult {
                    prompts: self.registry.list_prompts(),
                    next_cursor: None,
                })?)
            }
            McpMethod::PromptsGet => self.get_prompt(params).await,
            // Only reachable if a capability above were advertised without
            // a handler behind it.
            McpMethod::ResourcesSubscribe
            | McpMethod::ResourcesUnsubscribe
            | McpMethod::LoggingSetLevel
            | McpMethod::Unknown(_) => Err(Error::MethodNotFound(request.method)),
        }
    }

    async fn initialize(&self, session: &Session, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = parse_params(params)?;
        let version = session.initialize(params).await?;
        Ok(serde_json::to_value(InitializeResult {
            protocol_version: version.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        })?)
    }

    async fn call_tool(&self, params: Option<Value>, ctx: &RequestContext) -> Result<Value> {
        let params: CallToolParams = parse_params(params)?;
        let tool = self
            .registry
            .get_tool(&params.name)
            .ok_or_else(|| Error::ToolNotFound(params.name.clone()))?;

        validate_arguments(&tool.definition.input_schema, &params.arguments)?;

        self.metrics.inc_tool_calls();
        let name = params.name;
        let outcome = AssertUnwindSafe(tool.handler.execute_with_context(params.arguments, ctx))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!(tool = %name, "Tool returned an error: {}", e);
                error_result(e.to_string())
            }
            Err(panic) => {
                error!(tool = %name, "Tool panicked: {}", panic_message(&*panic));
                error_result(format!(
                    "Tool '{}' failed unexpectedly: {}",
                    name,
                    panic_message(&*panic)
                ))
            }
        };
        if result.is_error {
            self.metrics.inc_tool_errors();
        }
        Ok(serde_json::to_value(result)?)
    }

    async fn read_resource(&self, params: Option<Value>) -> Result<Value> {
        let params: ReadResourceParams = parse_params(params)?;
        let resolved = self.registry.resolve_resource(&params.uri)?;
        let contents = resolved
            .reader
            .read(&resolved.uri, &resolved.variables)
            .await?;
        Ok(serde_json::to_value(ReadResourceResult {
            contents: vec![contents],
        })?)
    }

    async fn get_prompt(&self, params: Option<Value>) -> Result<Value> {
        let params: GetPromptParams = parse_params(params)?;
        let (prompt, generator) = self
            .registry
            .get_prompt(&params.name)
            .ok_or_else(|| Error::PromptNotFound(params.name.clone()))?;
        prompt.check_arguments(&params.arguments)?;

        let messages = generator.generate(&params.arguments).await?;
        Ok(serde_json::to_value(GetPromptResult {
            description: prompt.description,
            messages,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::{success_result, ToolHandler};
    use crate::mcp::prompts::TemplatePrompt;
    use crate::mcp::prompts::{Prompt, PromptArgument};
    use crate::mcp::protocol::{error_codes, Implementation, RequestId, Tool, ToolResult};
    use crate::mcp::resources::{Resource, ResourceContents, ResourceReader};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Counts invocations; fails or panics on demand.
    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for CountingTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "count".to_string(),
                description: "Counts calls".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "mode": { "type": "string", "enum": ["ok", "fail", "panic", "hang"] }
                    },
                    "required": ["mode"]
                }),
            }
        }

        async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match args["mode"].as_str() {
                Some("fail") => Err(Error::FileNotFound("missing.txt".to_string())),
                Some("panic") => panic!("boom"),
                Some("hang") => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                _ => Ok(success_result("counted")),
            }
        }
    }

    struct FixedReader;

    #[async_trait]
    impl ResourceReader for FixedReader {
        async fn read(&self, uri: &str, _v: &HashMap<String, String>) -> Result<ResourceContents> {
            Ok(ResourceContents::text(uri, "text/plain", "fixed"))
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register_tool(CountingTool {
                calls: calls.clone(),
            })
            .unwrap();
        registry
            .register_resource(
                Resource {
                    uri: "mem://fixed".to_string(),
                    name: "fixed".to_string(),
                    description: None,
                    mime_type: None,
                },
                Arc::new(FixedReader),
            )
            .unwrap();
        registry
            .register_prompt(
                Prompt {
                    name: "greet".to_string(),
                    description: Some("Greets".to_string()),
                    arguments: vec![PromptArgument::required("who", "Name")],
                },
                Arc::new(TemplatePrompt::new("Hello {{who}}")),
            )
            .unwrap();
        let server_info = Implementation {
            name: "test-server".to_string(),
            version: "0.0.1".to_string(),
        };
        (Dispatcher::new(Arc::new(registry), server_info), calls)
    }

    async fn ready_session(dispatcher: &Dispatcher) -> Session {
        let session = Session::new("test");
        session.attach().await;
        let init = request(
            0,
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "c", "version": "1" }
            }),
        );
        let response = dispatcher
            .dispatch(&session, init, &RequestContext::new(RequestId::Number(0)))
            .await
            .unwrap();
        assert!(!response.is_error());
        session
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, Some(params))
    }

    async fn call(dispatcher: &Dispatcher, session: &Session, req: JsonRpcRequest) -> JsonRpcResponse {
        let ctx = RequestContext::new(req.id.clone());
        dispatcher.dispatch(session, req, &ctx).await.unwrap()
    }

    fn error_code(response: &JsonRpcResponse) -> i32 {
        response.error.as_ref().map(|e| e.code).unwrap_or(0)
    }

    #[test]
    fn test_method_table() {
        assert_eq!(McpMethod::parse("tools/call"), McpMethod::ToolsCall);
        assert_eq!(McpMethod::parse("nope"), McpMethod::Unknown("nope".to_string()));
        assert_eq!(McpMethod::parse("ping").capability(), None);
        assert_eq!(
            McpMethod::parse("resources/subscribe").capability(),
            Some(Capability::ResourceSubscriptions)
        );
    }

    #[tokio::test]
    async fn test_initialize_advertises_registry_capabilities() {
        let (dispatcher, _) = dispatcher();
        let session = Session::new("init");
        session.attach().await;

        let response = call(
            &dispatcher,
            &session,
            request(
                1,
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "c", "version": "1" }
                }),
            ),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "test-server");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["capabilities"]["resources"]["subscribe"], false);
        assert!(result["capabilities"]["prompts"].is_object());
        assert!(result["capabilities"].get("logging").is_none());
    }

    #[tokio::test]
    async fn test_request_before_initialize_is_rejected() {
        let (dispatcher, _) = dispatcher();
        let session = Session::new("early");
        session.attach().await;

        let response = call(&dispatcher, &session, request(7, "tools/list", json!({}))).await;
        assert_eq!(response.id, Some(RequestId::Number(7)));
        assert_eq!(error_code(&response), error_codes::INVALID_REQUEST);

        let pong = call(&dispatcher, &session, request(8, "ping", json!({}))).await;
        assert_eq!(pong.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_unknown_and_ungated_methods() {
        let (dispatcher, _) = dispatcher();
        let session = ready_session(&dispatcher).await;

        for method in ["does/not/exist", "resources/subscribe", "logging/setLevel"] {
            let response = call(&dispatcher, &session, request(2, method, json!({}))).await;
            assert_eq!(error_code(&response), error_codes::METHOD_NOT_FOUND, "{}", method);
            assert_eq!(response.id, Some(RequestId::Number(2)));
        }
    }

    #[tokio::test]
    async fn test_tool_call_success_and_unknown_tool() {
        let (dispatcher, calls) = dispatcher();
        let session = ready_session(&dispatcher).await;

        let ok = call(
            &dispatcher,
            &session,
            request(3, "tools/call", json!({"name": "count", "arguments": {"mode": "ok"}})),
        )
        .await;
        assert_eq!(ok.id, Some(RequestId::Number(3)));
        assert_eq!(ok.result.unwrap()["isError"], false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let unknown = call(
            &dispatcher,
            &session,
            request(4, "tools/call", json!({"name": "nope", "arguments": {}})),
        )
        .await;
        assert_eq!(error_code(&unknown), error_codes::INVALID_PARAMS);
        assert!(unknown.error.unwrap().message.contains("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schema_violation_never_reaches_handler() {
        let (dispatcher, calls) = dispatcher();
        let session = ready_session(&dispatcher).await;

        let missing = call(
            &dispatcher,
            &session,
            request(5, "tools/call", json!({"name": "count", "arguments": {}})),
        )
        .await;
        assert_eq!(error_code(&missing), error_codes::INVALID_PARAMS);
        assert!(missing.error.unwrap().message.contains("'mode'"));

        let wrong = call(
            &dispatcher,
            &session,
            request(6, "tools/call", json!({"name": "count", "arguments": {"mode": 1}})),
        )
        .await;
        assert_eq!(error_code(&wrong), error_codes::INVALID_PARAMS);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_become_tool_errors() {
        let (dispatcher, _) = dispatcher();
        let session = ready_session(&dispatcher).await;

        let failed = call(
            &dispatcher,
            &session,
            request(9, "tools/call", json!({"name": "count", "arguments": {"mode": "fail"}})),
        )
        .await;
        let result = failed.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("missing.txt"));

        let panicked = call(
            &dispatcher,
            &session,
            request(10, "tools/call", json!({"name": "count", "arguments": {"mode": "panic"}})),
        )
        .await;
        let result = panicked.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("boom"));

        // The dispatcher keeps working afterwards.
        let ok = call(
            &dispatcher,
            &session,
            request(11, "tools/call", json!({"name": "count", "arguments": {"mode": "ok"}})),
        )
        .await;
        assert_eq!(ok.result.unwrap()["isError"], false);
        assert_eq!(dispatcher.metrics().snapshot().tool_errors, 2);
    }

    #[tokio::test]
    async fn test_timeout_yields_timeout_error() {
        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_request_timeout(Some(Duration::from_millis(50)));
        let session = ready_session(&dispatcher).await;

        let response = call(
            &dispatcher,
            &session,
            request(12, "tools/call", json!({"name": "count", "arguments": {"mode": "hang"}})),
        )
        .await;
        assert_eq!(error_code(&response), error_codes::REQUEST_TIMEOUT);
        assert_eq!(response.id, Some(RequestId::Number(12)));
    }

    #[tokio::test]
    async fn test_cancelled_request_gets_no_response() {
        let (dispatcher, _) = dispatcher();
        let session = ready_session(&dispatcher).await;

        let token = CancellationToken::new();
        let ctx = RequestContext::new(RequestId::Number(13)).with_cancellation(token.clone());
        let req = request(13, "tools/call", json!({"name": "count", "arguments": {"mode": "hang"}}));

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        };
        let (response, _) = tokio::join!(dispatcher.dispatch(&session, req, &ctx), canceller);
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_resources_and_prompts() {
        let (dispatcher, _) = dispatcher();
        let session = ready_session(&dispatcher).await;

        let read = call(&dispatcher, &session, request(14, "resources/read", json!({"uri": "mem://fixed"}))).await;
        assert_eq!(read.result.unwrap()["contents"][0]["text"], "fixed");

        let missing = call(&dispatcher, &session, request(15, "resources/read", json!({"uri": "mem://nope"}))).await;
        assert_eq!(error_code(&missing), error_codes::RESOURCE_NOT_FOUND);

        let prompt = call(
            &dispatcher,
            &session,
            request(16, "prompts/get", json!({"name": "greet", "arguments": {"who": "Ada"}})),
        )
        .await;
        let result = prompt.result.unwrap();
        assert_eq!(result["messages"][0]["content"]["text"], "Hello Ada");
        assert_eq!(result["messages"][0]["role"], "user");

        let no_args = call(&dispatcher, &session, request(17, "prompts/get", json!({"name": "greet"}))).await;
        assert_eq!(error_code(&no_args), error_codes::INVALID_PARAMS);

        let unknown = call(&dispatcher, &session, request(18, "prompts/get", json!({"name": "nope"}))).await;
        assert_eq!(error_code(&unknown), error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_list_methods_accept_cursor() {
        let (dispatcher, _) = dispatcher();
        let session = ready_session(&dispatcher).await;

        let tools = call(&dispatcher, &session, request(19, "tools/list", json!({"cursor": "abc"}))).await;
        let result = tools.result.unwrap();
        assert_eq!(result["tools"][0]["name"], "count");
        assert!(result.get("nextCursor").is_none());

        let templates = call(&dispatcher, &session, request(20, "resources/templates/list", json!({}))).await;
        assert_eq!(templates.result.unwrap()["resourceTemplates"], json!([]));

        let bad = call(&dispatcher, &session, request(21, "tools/list", json!({"cursor": 5}))).await;
        assert_eq!(error_code(&bad), error_codes::INVALID_PARAMS);
    }
}
