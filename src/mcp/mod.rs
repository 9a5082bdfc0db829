//! Model Context Protocol (MCP) implementation.
//!
//! # Architecture
//!
//! - `codec` - Newline-delimited JSON framing
//! - `protocol` - Core MCP types and message definitions
//! - `transport` - Transport layer (stdio, generic streams, in-process channels)
//! - `session` - Session lifecycle and capability negotiation
//! - `registry` - Tools, resources, and prompts offered by the server
//! - `dispatcher` - Per-request routing, validation, and error mapping
//! - `server` - Read pump and in-flight request management

pub mod codec;
pub mod dispatcher;
pub mod handler;
pub mod progress;
pub mod prompts;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod server;
pub mod session;
pub mod transport;
pub mod validation;

pub use dispatcher::Dispatcher;
pub use handler::{RequestContext, ToolHandler};
pub use protocol::*;
pub use registry::Registry;
pub use server::McpServer;
pub use session::{Session, SessionState};
pub use transport::{ChannelTransport, StdioTransport, StreamTransport, Transport};
