//! Workspace MCP Server
//!
//! A Model Context Protocol server exposing filesystem and code-analysis
//! tools for one workspace directory, over stdio or streamable HTTP.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use workspace_mcp::config::{Args, Config, LogFormat, Transport};
use workspace_mcp::mcp::dispatcher::Dispatcher;
use workspace_mcp::mcp::protocol::ServerInfo;
use workspace_mcp::mcp::registry::Registry;
use workspace_mcp::mcp::server::McpServer;
use workspace_mcp::mcp::transport::StdioTransport;
use workspace_mcp::metrics::Metrics;
use workspace_mcp::service::WorkspaceService;
use workspace_mcp::{tools, SERVER_NAME, VERSION};

const INSTRUCTIONS: &str = "Tools operate on files inside the workspace root; paths are relative to it. \
Read `workspace://info` for the root and limits, or `file://{path}` resources for file contents.";

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr; stdout belongs to the stdio transport.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::load(args).context("Invalid configuration")?;
    init_logging(&config)?;

    info!("{} v{}", SERVER_NAME, VERSION);
    info!("Workspace: {:?}", config.workspace);
    info!("Transport: {:?}", config.transport);

    let workspace = Arc::new(
        WorkspaceService::from_config(&config).context("Cannot open workspace")?,
    );
    if workspace.is_read_only() {
        info!("Read-only mode: write_file and delete_file are disabled");
    }

    let mut registry = Registry::new();
    tools::register_all(&mut registry, workspace).context("Failed to register handlers")?;
    info!("Registered {} MCP tools", registry.tool_count());

    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        ServerInfo {
            name: SERVER_NAME.to_string(),
            version: VERSION.to_string(),
        },
    )
    .with_instructions(INSTRUCTIONS)
    .with_request_timeout(config.request_timeout())
    .with_metrics(Metrics::new());
    let server = McpServer::new(dispatcher);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                signal.cancel();
            }
            Err(e) => warn!("Cannot listen for interrupt: {}", e),
        }
    });

    match config.transport {
        Transport::Stdio => {
            info!("Starting stdio transport...");
            let result = server
                .serve_with_shutdown(StdioTransport::stdio(), shutdown)
                .await;
            // Runtime shutdown would wait on the blocking stdin read, which
            // only returns once the peer writes or closes.
            match result {
                Ok(()) => {
                    info!("Server stopped");
                    std::process::exit(0);
                }
                Err(e) => {
                    error!("Stdio transport failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Transport::Http => {
            info!("Starting HTTP transport on {}...", config.bind_address());
            workspace_mcp::http::start_server(&config, server, shutdown).await?;
        }
    }

    info!("Server stopped");
    Ok(())
}
