//! Workspace MCP Server
//!
//! A Model Context Protocol (MCP) server exposing a sandboxed workspace to an
//! AI host: filesystem tools, code-analysis tools, file resources, and review
//! prompts.
//!
//! # Architecture
//!
//! 1. **MCP Layer** (`mcp`) - Framing, transports, session lifecycle,
//!    capability registry, and request dispatch
//! 2. **Service Layer** (`service`) - The workspace sandbox shared by handlers
//! 3. **Tools Layer** (`tools`) - Filesystem and analysis tools
//! 4. **HTTP Layer** (`http`) - Streamable HTTP transport
//!
//! The MCP layer knows nothing about the workspace: everything it serves is
//! registered into a [`mcp::Registry`] at startup.

pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod metrics;
pub mod service;
pub mod tools;

pub use error::{Error, Result};

/// Server name reported during initialization.
pub const SERVER_NAME: &str = "workspace-mcp";

/// Server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default maximum file size the tools will read (1MB)
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;
