//! Error types for the workspace MCP server.

use thiserror::Error;

use crate::mcp::protocol::error_codes;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Protocol Errors =====
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Session not initialized: received '{0}' before initialize")]
    NotInitialized(String),

    #[error("Session already initialized")]
    AlreadyInitialized,

    #[error("Session closed")]
    SessionClosed,

    // ===== Registry Errors =====
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    // ===== Workspace Errors =====
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File too large: {path} ({size} bytes)")]
    FileTooLarge { path: String, size: u64 },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Access denied: {0} is outside the workspace")]
    OutsideWorkspace(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ===== Transport Errors =====
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP server error: {0}")]
    HttpServer(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Cancelled: request was cancelled")]
    Cancelled,
}

impl Error {
    /// The JSON-RPC error code this error is reported with on the wire.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_)
            | Self::NotInitialized(_)
            | Self::AlreadyInitialized
            | Self::SessionClosed => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_)
            | Self::ToolNotFound(_)
            | Self::PromptNotFound(_)
            | Self::InvalidToolArguments(_)
            | Self::InvalidPath(_)
            | Self::OutsideWorkspace(_) => error_codes::INVALID_PARAMS,
            Self::ResourceNotFound(_) | Self::FileNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            Self::Timeout { .. } => error_codes::REQUEST_TIMEOUT,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Whether the error was caused by the peer rather than by this server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code(),
            error_codes::PARSE_ERROR
                | error_codes::INVALID_REQUEST
                | error_codes::METHOD_NOT_FOUND
                | error_codes::INVALID_PARAMS
                | error_codes::RESOURCE_NOT_FOUND
        )
    }

    /// Create a duplicate-name registration error.
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }
}
