//! Configuration management for the workspace MCP server.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional YAML file (`--config`), then command-line flags and their
//! `WORKSPACE_MCP_*` environment variables.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Command-line arguments for the workspace MCP server.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "workspace-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server exposing workspace filesystem and code-analysis tools")]
pub struct Args {
    /// Workspace root directory [default: current directory]
    #[arg(short, long, env = "WORKSPACE_MCP_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Transport mode [default: stdio]
    #[arg(short, long, env = "WORKSPACE_MCP_TRANSPORT")]
    pub transport: Option<Transport>,

    /// Address to bind (http transport) [default: 127.0.0.1]
    #[arg(long, env = "WORKSPACE_MCP_HOST")]
    pub host: Option<String>,

    /// HTTP port (http transport) [default: 3000]
    #[arg(short, long, env = "WORKSPACE_MCP_PORT")]
    pub port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long, env = "WORKSPACE_MCP_DEBUG")]
    pub debug: bool,

    /// Log output format [default: text]
    #[arg(long, env = "WORKSPACE_MCP_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Per-request timeout in seconds, 0 disables it [default: 60]
    #[arg(long, env = "WORKSPACE_MCP_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Largest file the tools will read, in bytes [default: 1048576]
    #[arg(long, env = "WORKSPACE_MCP_MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,

    /// Do not offer tools that modify the workspace
    #[arg(long, env = "WORKSPACE_MCP_READ_ONLY")]
    pub read_only: bool,

    /// YAML configuration file
    #[arg(short, long, env = "WORKSPACE_MCP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace root directory
    pub workspace: PathBuf,
    /// Transport mode
    pub transport: Transport,
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Debug mode
    pub debug: bool,
    /// Log output format
    pub log_format: LogFormat,
    /// Request timeout in seconds (0 = none)
    pub request_timeout_secs: u64,
    /// Maximum file size
    pub max_file_size: u64,
    /// Omit mutating tools
    pub read_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            transport: Transport::Stdio,
            host: "127.0.0.1".to_string(),
            port: 3000,
            debug: false,
            log_format: LogFormat::Text,
            request_timeout_secs: 60,
            max_file_size: crate::MAX_FILE_SIZE,
            read_only: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut config = Self::default();
        args.apply_to(&mut config);
        config
    }
}

impl Args {
    /// Overlay the settings given on the command line or via environment.
    pub fn apply_to(self, config: &mut Config) {
        if let Some(workspace) = self.workspace {
            config.workspace = workspace;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout_secs = secs;
        }
        if let Some(max) = self.max_file_size {
            config.max_file_size = max;
        }
        config.debug |= self.debug;
        config.read_only |= self.read_only;
    }
}

impl Config {
    /// Load a YAML configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Resolve the final configuration from parsed arguments.
    pub fn load(mut args: Args) -> Result<Self> {
        let mut config = match args.config.take() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        args.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(Error::Config("max_file_size must be positive".to_string()));
        }
        Ok(())
    }

    /// The request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["workspace-mcp"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_transport_default() {
        assert_eq!(Transport::default(), Transport::Stdio);
    }

    #[test]
    fn test_transport_serialization() {
        let transports = [
            (Transport::Stdio, "\"stdio\""),
            (Transport::Http, "\"http\""),
        ];

        for (transport, expected) in &transports {
            let json = serde_json::to_string(transport).unwrap();
            assert_eq!(&json, *expected);
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(60)));
        assert!(!config.read_only);
    }

    #[test]
    fn test_args_override_defaults() {
        let config: Config = parse(&[
            "--workspace",
            "/tmp/ws",
            "--transport",
            "http",
            "--port",
            "8080",
            "--log-format",
            "json",
            "--request-timeout-secs",
            "0",
            "--read-only",
        ])
        .into();
        assert_eq!(config.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.request_timeout(), None);
        assert!(config.read_only);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config = Config::from_yaml("port: 9999\nread_only: true\n").unwrap();
        assert_eq!(config.port, 9999);
        assert!(config.read_only);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert!(Config::from_yaml("port: [1, 2]").is_err());
    }

    #[test]
    fn test_file_then_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp.yaml");
        std::fs::write(&path, "transport: http\nport: 4000\nhost: 0.0.0.0\n").unwrap();

        let config = Config::load(parse(&["--config", path.to_str().unwrap(), "--port", "5000"])).unwrap();
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::load(parse(&["--config", "/no/such/file.yaml"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate() {
        let config = Config {
            max_file_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
