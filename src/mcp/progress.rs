//! MCP Progress Notifications
//!
//! Support for emitting progress updates during long-running tool calls. A
//! host opts in by sending `_meta.progressToken` with its request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::protocol::methods;
use crate::mcp::transport::Outbound;

/// Progress token for tracking operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl ProgressToken {
    /// Extract the token from request params (`params._meta.progressToken`).
    pub fn from_params(params: Option<&Value>) -> Option<Self> {
        let token = params?.get("_meta")?.get("progressToken")?;
        serde_json::from_value(token.clone()).ok()
    }
}

/// Progress notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub progress_token: ProgressToken,
    pub progress: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Progress reporter for emitting updates.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    token: ProgressToken,
    outbound: Outbound,
    total: Option<u64>,
}

impl ProgressReporter {
    pub fn new(token: ProgressToken, outbound: Outbound, total: Option<u64>) -> Self {
        Self {
            token,
            outbound,
            total,
        }
    }

    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Send a progress notification. Send failures are ignored.
    pub async fn report(&self, progress: u64, message: Option<&str>) {
        let params = ProgressParams {
            progress_token: self.token.clone(),
            progress,
            total: self.total,
            message: message.map(String::from),
        };
        if let Ok(params) = serde_json::to_value(params) {
            let _ = self
                .outbound
                .notify(methods::NOTIFICATION_PROGRESS, Some(params))
                .await;
        }
    }

    /// Report completion, if a total is known.
    pub async fn complete(&self, message: Option<&str>) {
        if let Some(total) = self.total {
            self.report(total, message).await;
        }
    }
}
