//! Tool handler trait and argument helpers.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::mcp::progress::{ProgressReporter, ProgressToken};
use crate::mcp::protocol::{ContentBlock, RequestId, Tool, ToolResult};
use crate::mcp::transport::Outbound;

/// Per-request state handed to a handler alongside its arguments.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    /// Cancelled when the host sends `notifications/cancelled` for this request.
    pub cancellation: CancellationToken,
    progress_token: Option<ProgressToken>,
    outbound: Option<Outbound>,
}

impl RequestContext {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            cancellation: CancellationToken::new(),
            progress_token: None,
            outbound: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress_token(mut self, token: Option<ProgressToken>) -> Self {
        self.progress_token = token;
        self
    }

    pub fn with_outbound(mut self, outbound: Outbound) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A progress reporter, if the host asked for progress on this request.
    pub fn progress(&self, total: Option<u64>) -> Option<ProgressReporter> {
        match (&self.progress_token, &self.outbound) {
            (Some(token), Some(outbound)) => Some(ProgressReporter::new(
                token.clone(),
                outbound.clone(),
                total,
            )),
            _ => None,
        }
    }
}

/// Handler for MCP tool calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> Tool;

    /// Execute the tool with arguments already validated against the schema.
    async fn execute(&self, arguments: HashMap<String, Value>) -> Result<ToolResult>;

    /// Execute with access to the request context. Handlers that report
    /// progress or observe cancellation override this.
    async fn execute_with_context(
        &self,
        arguments: HashMap<String, Value>,
        _ctx: &RequestContext,
    ) -> Result<ToolResult> {
        self.execute(arguments).await
    }
}

/// Helper macro for creating tool input schemas.
#[macro_export]
macro_rules! tool_schema {
    ($($json:tt)+) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $($json)+
            }
        })
    };
}

/// Helper to create a text content block.
pub fn text_content(text: impl Into<String>) -> ContentBlock {
    ContentBlock::Text { text: text.into() }
}

/// Helper to create a successful tool result.
pub fn success_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: false,
    }
}

/// Helper to create a successful tool result holding pretty-printed JSON.
pub fn json_result<T: serde::Serialize>(value: &T) -> Result<ToolResult> {
    Ok(success_result(serde_json::to_string_pretty(value)?))
}

/// Helper to create an error tool result.
pub fn error_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: true,
    }
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &HashMap<String, Value>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| Error::InvalidToolArguments(format!("Missing required argument: {}", name)))
}

/// Helper to extract an optional string argument.
pub fn get_optional_string_arg(args: &HashMap<String, Value>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(String::from)
}

/// Helper to extract an optional non-negative integer argument.
pub fn get_usize_arg(args: &HashMap<String, Value>, name: &str, default: usize) -> usize {
    args.get(name)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(default)
}

/// Helper to extract a boolean argument with a default.
pub fn get_bool_arg(args: &HashMap<String, Value>, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}
