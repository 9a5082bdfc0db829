//! MCP Resources Support
//!
//! Resource wire types, the [`ResourceReader`] seam, URI template matching,
//! and the built-in workspace resources.

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::fs;

use crate::error::{Error, Result};
use crate::service::WorkspaceService;

/// A resource exposed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A family of resources addressed by an RFC 6570 style URI template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resource contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>, // base64 encoded
}

impl ResourceContents {
    pub fn text(uri: impl Into<String>, mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            text: Some(text.into()),
            blob: None,
        }
    }

    pub fn blob(uri: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            text: None,
            blob: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

/// Result of resources/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of resources/templates/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Params of resources/read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// Result of resources/read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Reads the content behind a resolved resource URI.
///
/// `variables` holds the template variables bound during resolution; it is
/// empty for static resources.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, uri: &str, variables: &HashMap<String, String>) -> Result<ResourceContents>;
}

/// Compiled URI template.
///
/// `{name}` binds one path segment (no `/`), `{+name}` binds the rest of the
/// URI including `/`.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |why: &str| Error::Config(format!("Invalid URI template '{}': {}", template, why));

        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            pattern.push_str(&regex::escape(&rest[..open]));
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| invalid("unclosed '{'"))?;
            let expr = &rest[open + 1..close];
            let (greedy, name) = match expr.strip_prefix('+') {
                Some(name) => (true, name),
                None => (false, expr),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("variable names must be alphanumeric"));
            }
            if variables.iter().any(|v| v == name) {
                return Err(invalid("variable used twice"));
            }
            pattern.push_str(&format!(
                "(?P<{}>{})",
                name,
                if greedy { ".+" } else { "[^/]+" }
            ));
            variables.push(name.to_string());
            rest = &rest[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unmatched '}'"));
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self { regex, variables })
    }

    /// Match a concrete URI, returning the bound variables.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        Some(
            self.variables
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// `workspace://info`: a JSON summary of the workspace and the server.
pub struct WorkspaceInfoResource {
    workspace: Arc<WorkspaceService>,
}

impl WorkspaceInfoResource {
    pub const URI: &'static str = "workspace://info";

    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }

    pub fn resource() -> Resource {
        Resource {
            uri: Self::URI.to_string(),
            name: "Workspace info".to_string(),
            description: Some("Workspace root and server settings".to_string()),
            mime_type: Some("application/json".to_string()),
        }
    }
}

#[async_trait]
impl ResourceReader for WorkspaceInfoResource {
    async fn read(&self, uri: &str, _variables: &HashMap<String, String>) -> Result<ResourceContents> {
        let info = json!({
            "server": { "name": crate::SERVER_NAME, "version": crate::VERSION },
            "workspace": self.workspace.root().display().to_string(),
            "workspaceUri": WorkspaceService::path_to_file_uri(self.workspace.root()),
            "readOnly": self.workspace.is_read_only(),
            "maxFileSize": self.workspace.max_file_size(),
        });
        Ok(ResourceContents::text(
            uri,
            "application/json",
            serde_json::to_string_pretty(&info)?,
        ))
    }
}

/// `file://{+path}`: workspace files and directories.
///
/// Files come back as text when they are valid UTF-8 and as a base64 blob
/// otherwise. Directories come back as a text listing, one entry per line,
/// with a trailing `/` on subdirectories.
pub struct FileResource {
    workspace: Arc<WorkspaceService>,
}

impl FileResource {
    pub const URI_TEMPLATE: &'static str = "file://{+path}";

    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }

    pub fn template() -> ResourceTemplate {
        ResourceTemplate {
            uri_template: Self::URI_TEMPLATE.to_string(),
            name: "Workspace files".to_string(),
            description: Some(
                "Files and directories inside the workspace. Directory URIs end with '/'."
                    .to_string(),
            ),
            mime_type: None,
        }
    }

    async fn list_directory(&self, uri: &str, dir: &std::path::Path) -> Result<ResourceContents> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();
        Ok(ResourceContents::text(uri, "text/plain", entries.join("\n")))
    }
}

#[async_trait]
impl ResourceReader for FileResource {
    async fn read(&self, uri: &str, variables: &HashMap<String, String>) -> Result<ResourceContents> {
        let raw = variables
            .get("path")
            .ok_or_else(|| Error::InvalidParams(format!("No path in resource URI: {}", uri)))?;
        let decoded = WorkspaceService::decode_file_uri(&format!("file://{}", raw))
            .unwrap_or_else(|| raw.clone());
        let path = self.workspace.resolve(&decoded)?;

        let metadata = fs::metadata(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ResourceNotFound(uri.to_string()),
            _ => Error::Io(e),
        })?;

        if metadata.is_dir() {
            return self.list_directory(uri, &path).await;
        }
        if uri.ends_with('/') {
            return Err(Error::InvalidParams(format!("Not a directory: {}", decoded)));
        }
        if metadata.len() > self.workspace.max_file_size() {
            return Err(Error::FileTooLarge {
                path: decoded,
                size: metadata.len(),
            });
        }

        let bytes = fs::read(&path).await?;
        let mime_type = WorkspaceService::guess_mime_type(&path);
        Ok(match String::from_utf8(bytes) {
            Ok(text) => ResourceContents::text(uri, mime_type, text),
            Err(e) => {
                let mime_type = if mime_type.starts_with("text/") {
                    "application/octet-stream".to_string()
                } else {
                    mime_type
                };
                ResourceContents::blob(uri, mime_type, e.as_bytes())
            }
        })
    }
}
