//! Filesystem tools: read, write, list, search, stat, and delete.
//!
//! Every path argument is resolved through [`WorkspaceService::resolve`].
//! Domain failures are returned as errors and surface to the host as
//! `isError` results naming the offending path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::mcp::handler::{
    get_bool_arg, get_optional_string_arg, get_string_arg, get_usize_arg, json_result,
    success_result, ToolHandler,
};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::service::WorkspaceService;
use crate::tool_schema;

/// Hard cap on entries returned by listings and searches.
const MAX_LISTING: usize = 10_000;

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// Metadata of an existing path, or a not-found error naming it.
async fn existing(path: &Path, shown: &str) -> Result<std::fs::Metadata> {
    fs::symlink_metadata(path)
        .await
        .map_err(|_| Error::FileNotFound(shown.to_string()))
}

fn kind_of(metadata: &std::fs::Metadata) -> &'static str {
    let ft = metadata.file_type();
    if ft.is_symlink() {
        "symlink"
    } else if ft.is_dir() {
        "directory"
    } else {
        "file"
    }
}

/// Walk `base`, skipping ignored directories and, unless asked, hidden entries.
pub(crate) fn walk(base: &Path, max_depth: usize, include_hidden: bool) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(base)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            let name = e.file_name().to_string_lossy();
            (include_hidden || !is_hidden(&name)) && !WorkspaceService::should_ignore(&name)
        })
        .filter_map(|e| e.ok())
}

// ===== read_file =====

/// Read a text file.
pub struct ReadFileTool {
    workspace: Arc<WorkspaceService>,
}

impl ReadFileTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "read_file".to_string(),
            description: "Read a UTF-8 text file from the workspace. Use max_bytes to read only the beginning of a large file.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "minLength": 1,
                        "description": "File path relative to the workspace root"
                    },
                    "max_bytes": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Read at most this many bytes"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_string_arg(&args, "path")?;
        let limit = args.get("max_bytes").and_then(Value::as_u64);
        let path = self.workspace.resolve(&shown)?;

        let metadata = existing(&path, &shown).await?;
        if metadata.is_dir() {
            return Err(Error::InvalidPath(format!("{} is a directory", shown)));
        }
        let size = metadata.len();
        let max = self.workspace.max_file_size();
        if limit.is_none() && size > max {
            return Err(Error::FileTooLarge { path: shown, size });
        }

        let read_len = limit.unwrap_or(size).min(size).min(max);
        let mut bytes = Vec::with_capacity(read_len as usize);
        fs::File::open(&path)
            .await?
            .take(read_len)
            .read_to_end(&mut bytes)
            .await?;

        let truncated = (bytes.len() as u64) < size;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            // A limit may split a multi-byte character.
            Err(e) if truncated && e.utf8_error().error_len().is_none() => {
                let valid = e.utf8_error().valid_up_to();
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Err(_) => {
                return Err(Error::InvalidPath(format!(
                    "{} is not a UTF-8 text file; read it as a resource to get base64 content",
                    shown
                )))
            }
        };

        if truncated {
            Ok(success_result(format!(
                "{}\n\n[truncated: showing {} of {} bytes]",
                text,
                text.len(),
                size
            )))
        } else {
            Ok(success_result(text))
        }
    }
}

// ===== write_file =====

/// Create or overwrite a file.
pub struct WriteFileTool {
    workspace: Arc<WorkspaceService>,
}

impl WriteFileTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "write_file".to_string(),
            description: "Create or overwrite a text file in the workspace.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1, "description": "File path relative to the workspace root" },
                    "content": { "type": "string", "description": "Full new content of the file" },
                    "create_dirs": { "type": "boolean", "description": "Create missing parent directories (default: false)" }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_string_arg(&args, "path")?;
        let content = get_string_arg(&args, "content")?;
        let create_dirs = get_bool_arg(&args, "create_dirs", false);
        let path = self.workspace.resolve(&shown)?;

        if path == self.workspace.root() || fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::InvalidPath(format!("{} is a directory", shown)));
        }
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if create_dirs {
                    fs::create_dir_all(parent).await?;
                } else {
                    return Err(Error::FileNotFound(format!(
                        "{} (parent directory does not exist; set create_dirs to create it)",
                        shown
                    )));
                }
            }
        }

        let existed = path.exists();
        fs::write(&path, content.as_bytes()).await?;
        Ok(success_result(format!(
            "{} {} ({} bytes)",
            if existed { "Overwrote" } else { "Created" },
            shown,
            content.len()
        )))
    }
}

// ===== list_directory =====

#[derive(Serialize)]
struct Entry {
    path: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

/// List the entries of a directory.
pub struct ListDirectoryTool {
    workspace: Arc<WorkspaceService>,
}

impl ListDirectoryTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for ListDirectoryTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "list_directory".to_string(),
            description: "List files and directories. Ignores build output and dependency directories such as target/ and node_modules/.".to_string(),
            input_schema: tool_schema! {
                "path": { "type": "string", "description": "Directory relative to the workspace root (default: root)" },
                "recursive": { "type": "boolean", "description": "Descend into subdirectories (default: false)" },
                "include_hidden": { "type": "boolean", "description": "Include dot-files (default: false)" },
                "max_entries": { "type": "integer", "minimum": 1, "description": "Maximum entries to return (default: 1000)" }
            },
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_optional_string_arg(&args, "path").unwrap_or_else(|| ".".to_string());
        let recursive = get_bool_arg(&args, "recursive", false);
        let include_hidden = get_bool_arg(&args, "include_hidden", false);
        let max_entries = get_usize_arg(&args, "max_entries", 1000).min(MAX_LISTING);
        let dir = self.workspace.resolve(&shown)?;

        if !existing(&dir, &shown).await?.is_dir() {
            return Err(Error::InvalidPath(format!("{} is not a directory", shown)));
        }

        let workspace = self.workspace.clone();
        let (entries, truncated) = tokio::task::spawn_blocking(move || {
            let depth = if recursive { usize::MAX } else { 1 };
            let mut entries = Vec::new();
            let mut truncated = false;
            for entry in walk(&dir, depth, include_hidden) {
                if entries.len() >= max_entries {
                    truncated = true;
                    break;
                }
                let metadata = entry.metadata().ok();
                let kind = metadata.as_ref().map(kind_of).unwrap_or("file");
                entries.push(Entry {
                    path: workspace.relative(entry.path()),
                    kind,
                    size: metadata.filter(|m| m.is_file()).map(|m| m.len()),
                });
            }
            (entries, truncated)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        json_result(&json!({
            "path": shown,
            "entries": entries,
            "truncated": truncated,
        }))
    }
}

// ===== search_files =====

/// Find files by glob pattern.
pub struct SearchFilesTool {
    workspace: Arc<WorkspaceService>,
}

impl SearchFilesTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for SearchFilesTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "search_files".to_string(),
            description: "Find files whose path matches a glob pattern, e.g. '**/*.rs' or 'src/*test*'. A pattern without '/' is also matched against bare file names.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "minLength": 1, "description": "Glob pattern" },
                    "path": { "type": "string", "description": "Directory to search (default: root)" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 10000, "description": "Maximum matches (default: 100)" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let raw = get_string_arg(&args, "pattern")?;
        let shown = get_optional_string_arg(&args, "path").unwrap_or_else(|| ".".to_string());
        let max_results = get_usize_arg(&args, "max_results", 100);
        let pattern = Pattern::new(&raw)
            .map_err(|e| Error::InvalidToolArguments(format!("Invalid glob '{}': {}", raw, e)))?;
        let base = self.workspace.resolve(&shown)?;
        if !existing(&base, &shown).await?.is_dir() {
            return Err(Error::InvalidPath(format!("{} is not a directory", shown)));
        }

        let workspace = self.workspace.clone();
        let match_names = !raw.contains('/');
        let (matches, truncated) = tokio::task::spawn_blocking(move || {
            let options = MatchOptions {
                case_sensitive: true,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            };
            let mut matches = Vec::new();
            let mut truncated = false;
            for entry in walk(&base, usize::MAX, false) {
                let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
                let rel = rel.to_string_lossy().replace('\\', "/");
                let name = entry.file_name().to_string_lossy();
                if pattern.matches_with(&rel, options) || (match_names && pattern.matches(&name)) {
                    if matches.len() >= max_results {
                        truncated = true;
                        break;
                    }
                    matches.push(workspace.relative(entry.path()));
                }
            }
            (matches, truncated)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        json_result(&json!({
            "pattern": raw,
            "matches": matches,
            "truncated": truncated,
        }))
    }
}

// ===== get_file_info =====

#[derive(Debug, Serialize)]
struct FileInfo {
    path: String,
    #[serde(rename = "type")]
    kind: &'static str,
    size: u64,
    modified: Option<String>,
    readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
}

async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Stat a file or directory.
pub struct GetFileInfoTool {
    workspace: Arc<WorkspaceService>,
}

impl GetFileInfoTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for GetFileInfoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "get_file_info".to_string(),
            description: "Get size, type, modification time, read-only flag, and (for files) the SHA-256 of a path.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1, "description": "Path relative to the workspace root" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_string_arg(&args, "path")?;
        let path = self.workspace.resolve(&shown)?;
        let metadata = existing(&path, &shown).await?;

        let kind = kind_of(&metadata);
        let sha256 = if metadata.is_file() && metadata.len() <= self.workspace.max_file_size() {
            Some(sha256_file(&path).await?)
        } else {
            None
        };

        json_result(&FileInfo {
            path: self.workspace.relative(&path),
            kind,
            size: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
            readonly: metadata.permissions().readonly(),
            sha256,
        })
    }
}

// ===== delete_file =====

/// Delete a file or directory.
pub struct DeleteFileTool {
    workspace: Arc<WorkspaceService>,
}

impl DeleteFileTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for DeleteFileTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "delete_file".to_string(),
            description: "Delete a file, or a directory when recursive is set. The workspace root itself cannot be deleted.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1, "description": "Path relative to the workspace root" },
                    "recursive": { "type": "boolean", "description": "Delete non-empty directories (default: false)" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_string_arg(&args, "path")?;
        let recursive = get_bool_arg(&args, "recursive", false);
        let path = self.workspace.resolve(&shown)?;

        if path == self.workspace.root() {
            return Err(Error::InvalidPath("Refusing to delete the workspace root".to_string()));
        }
        let metadata = existing(&path, &shown).await?;

        if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_dir(&path).await.map_err(|_| {
                    Error::InvalidPath(format!(
                        "{} is a non-empty directory; set recursive to delete it",
                        shown
                    ))
                })?;
            }
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(success_result(format!("Deleted {}", shown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ContentBlock;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<WorkspaceService>) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(root.join("src/nested/util.rs"), "pub fn util() {}\n").unwrap();
        std::fs::write(root.join("README.md"), "# Demo\n").unwrap();
        std::fs::write(root.join(".env"), "SECRET=1\n").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        let ws = Arc::new(WorkspaceService::new(root).unwrap());
        (dir, ws)
    }

    fn args(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    fn text(result: &ToolResult) -> &str {
        match &result.content[0] {
            ContentBlock::Text { text } => text,
            other => panic!("Expected text, got {:?}", other),
        }
    }

    fn json_of(result: &ToolResult) -> Value {
        serde_json::from_str(text(result)).unwrap()
    }

    #[tokio::test]
    async fn test_read_file() {
        let (_dir, ws) = setup();
        let tool = ReadFileTool::new(ws);

        let result = tool.execute(args(json!({"path": "src/main.rs"}))).await.unwrap();
        assert_eq!(text(&result), "fn main() {}\n");

        let partial = tool
            .execute(args(json!({"path": "src/main.rs", "max_bytes": 2})))
            .await
            .unwrap();
        assert!(text(&partial).starts_with("fn\n\n[truncated: showing 2 of 13 bytes]"));
    }

    #[tokio::test]
    async fn test_read_file_errors_name_the_path() {
        let (dir, ws) = setup();
        let tool = ReadFileTool::new(ws.clone());

        let err = tool.execute(args(json!({"path": "missing.txt"}))).await.unwrap_err();
        assert!(err.to_string().contains("missing.txt"));

        let err = tool.execute(args(json!({"path": "src"}))).await.unwrap_err();
        assert!(err.to_string().contains("src is a directory"));

        let err = tool.execute(args(json!({"path": "../x"}))).await.unwrap_err();
        assert!(matches!(err, Error::OutsideWorkspace(_)));

        std::fs::write(dir.path().join("bin.dat"), [0xffu8, 0xfe, 0x00]).unwrap();
        let err = tool.execute(args(json!({"path": "bin.dat"}))).await.unwrap_err();
        assert!(err.to_string().contains("not a UTF-8 text file"));

        let small = ReadFileTool::new(Arc::new((*ws).clone().with_max_file_size(4)));
        let err = small.execute(args(json!({"path": "src/main.rs"}))).await.unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_write_file() {
        let (dir, ws) = setup();
        let tool = WriteFileTool::new(ws);

        let created = tool
            .execute(args(json!({"path": "notes.txt", "content": "hello"})))
            .await
            .unwrap();
        assert_eq!(text(&created), "Created notes.txt (5 bytes)");
        assert_eq!(std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "hello");

        let overwritten = tool
            .execute(args(json!({"path": "notes.txt", "content": "bye"})))
            .await
            .unwrap();
        assert!(text(&overwritten).starts_with("Overwrote"));

        let err = tool
            .execute(args(json!({"path": "a/b/c.txt", "content": "x"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("a/b/c.txt"));

        tool.execute(args(json!({"path": "a/b/c.txt", "content": "x", "create_dirs": true})))
            .await
            .unwrap();
        assert!(dir.path().join("a/b/c.txt").exists());

        assert!(tool
            .execute(args(json!({"path": "src", "content": "x"})))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let (_dir, ws) = setup();
        let tool = ListDirectoryTool::new(ws);

        let listing = json_of(&tool.execute(HashMap::new()).await.unwrap());
        let paths: Vec<&str> = listing["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["README.md", "src"]);
        assert_eq!(listing["entries"][1]["type"], "directory");
        assert_eq!(listing["entries"][0]["size"], 7);

        let recursive = json_of(
            &tool
                .execute(args(json!({"recursive": true, "include_hidden": true})))
                .await
                .unwrap(),
        );
        let paths: Vec<&str> = recursive["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["path"].as_str().unwrap())
            .collect();
        assert!(paths.contains(&".env"));
        assert!(paths.contains(&"src/nested/util.rs"));
        assert!(!paths.iter().any(|p| p.starts_with("node_modules")));

        let err = tool.execute(args(json!({"path": "README.md"}))).await.unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[tokio::test]
    async fn test_search_files() {
        let (_dir, ws) = setup();
        let tool = SearchFilesTool::new(ws);

        let found = json_of(&tool.execute(args(json!({"pattern": "*.rs"}))).await.unwrap());
        assert_eq!(found["matches"], json!(["src/main.rs", "src/nested/util.rs"]));

        let scoped = json_of(
            &tool
                .execute(args(json!({"pattern": "nested/*.rs", "path": "src"})))
                .await
                .unwrap(),
        );
        assert_eq!(scoped["matches"], json!(["src/nested/util.rs"]));

        let limited = json_of(
            &tool
                .execute(args(json!({"pattern": "**/*.rs", "max_results": 1})))
                .await
                .unwrap(),
        );
        assert_eq!(limited["matches"].as_array().unwrap().len(), 1);
        assert_eq!(limited["truncated"], true);

        assert!(tool.execute(args(json!({"pattern": "[unclosed"}))).await.is_err());
    }

    #[tokio::test]
    async fn test_get_file_info() {
        let (_dir, ws) = setup();
        let tool = GetFileInfoTool::new(ws);

        let info = json_of(&tool.execute(args(json!({"path": "README.md"}))).await.unwrap());
        assert_eq!(info["type"], "file");
        assert_eq!(info["size"], 7);
        assert_eq!(info["readonly"], false);
        assert_eq!(
            info["sha256"],
            hex::encode(Sha256::digest(b"# Demo\n"))
        );
        assert!(info["modified"].as_str().is_some());

        let dir_info = json_of(&tool.execute(args(json!({"path": "src"}))).await.unwrap());
        assert_eq!(dir_info["type"], "directory");
        assert!(dir_info.get("sha256").is_none());

        let err = tool.execute(args(json!({"path": "ghost/file.txt"}))).await.unwrap_err();
        assert!(err.to_string().contains("ghost/file.txt"));
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (dir, ws) = setup();
        let tool = DeleteFileTool::new(ws);

        tool.execute(args(json!({"path": "README.md"}))).await.unwrap();
        assert!(!dir.path().join("README.md").exists());

        let err = tool.execute(args(json!({"path": "src"}))).await.unwrap_err();
        assert!(err.to_string().contains("non-empty"));

        tool.execute(args(json!({"path": "src", "recursive": true}))).await.unwrap();
        assert!(!dir.path().join("src").exists());

        assert!(tool.execute(args(json!({"path": "."}))).await.is_err());
        assert!(tool.execute(args(json!({"path": "gone.txt"}))).await.is_err());
    }
}
