//! Workspace sandbox shared by tools and resources.
//!
//! Every path a host supplies is resolved against the workspace root and
//! rejected if it escapes it, lexically or through a symlink.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};

/// Characters escaped in file:// URI paths. `/` and `:` stay literal.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Directory names skipped by listings, scans, and searches.
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".git",
    ".venv",
];

/// The sandboxed workspace the server operates on.
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    root: PathBuf,
    max_file_size: u64,
    read_only: bool,
}

impl WorkspaceService {
    /// Open a workspace rooted at `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|_| Error::WorkspaceNotFound(root.display().to_string()))?;
        if !canonical.is_dir() {
            return Err(Error::WorkspaceNotFound(root.display().to_string()));
        }
        Ok(Self {
            root: canonical,
            max_file_size: crate::MAX_FILE_SIZE,
            read_only: false,
        })
    }

    /// Open the workspace described by the server configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.workspace)?
            .with_max_file_size(config.max_file_size)
            .with_read_only(config.read_only))
    }

    pub fn with_max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = max;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Resolve a host-supplied path (relative to the root, or absolute inside
    /// it) to an absolute path. The target does not need to exist.
    pub fn resolve(&self, input: &str) -> Result<PathBuf> {
        if input.contains('\0') {
            return Err(Error::InvalidPath(input.to_string()));
        }

        let candidate = Path::new(input);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(Error::OutsideWorkspace(input.to_string()));
        }

        // Symlinks may point elsewhere: check the deepest existing ancestor.
        let mut existing = normalized.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        if let Ok(canonical) = existing.canonicalize() {
            if !canonical.starts_with(&self.root) {
                return Err(Error::OutsideWorkspace(input.to_string()));
            }
        }

        Ok(normalized)
    }

    /// Path relative to the root, for display.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let shown = rel.to_string_lossy().replace('\\', "/");
        if shown.is_empty() {
            ".".to_string()
        } else {
            shown
        }
    }

    /// Whether a file or directory name matches common ignore patterns.
    pub fn should_ignore(name: &str) -> bool {
        IGNORED_DIRS.contains(&name) || name.ends_with(".lock") || name.ends_with(".pyc")
    }

    /// Convert a filesystem path to a percent-encoded file:// URI.
    pub fn path_to_file_uri(path: &Path) -> String {
        let path_str = path.to_string_lossy();

        #[cfg(windows)]
        {
            let normalized = path_str.replace('\\', "/");
            let encoded = utf8_percent_encode(&normalized, PATH_SEGMENT);
            if normalized.chars().nth(1) == Some(':') {
                format!("file:///{}", encoded)
            } else {
                format!("file://{}", encoded)
            }
        }

        #[cfg(not(windows))]
        {
            format!("file://{}", utf8_percent_encode(&path_str, PATH_SEGMENT))
        }
    }

    /// Decode a percent-encoded file:// URI to a path string.
    pub fn decode_file_uri(uri: &str) -> Option<String> {
        uri.strip_prefix("file://")
            .map(|path| percent_decode_str(path).decode_utf8_lossy().into_owned())
    }

    /// Infer a MIME type for a file path based on its extension.
    pub fn guess_mime_type(path: &Path) -> String {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let mime = match ext.as_str() {
            "rs" => "text/x-rust",
            "py" => "text/x-python",
            "js" | "jsx" | "mjs" => "text/javascript",
            "ts" | "tsx" => "text/typescript",
            "json" => "application/json",
            "yaml" | "yml" => "text/yaml",
            "toml" => "text/x-toml",
            "md" => "text/markdown",
            "html" | "htm" => "text/html",
            "css" => "text/css",
            "sh" | "bash" => "text/x-shellscript",
            "sql" => "text/x-sql",
            "go" => "text/x-go",
            "java" => "text/x-java",
            "c" | "h" => "text/x-c",
            "cpp" | "hpp" | "cc" => "text/x-c++",
            "rb" => "text/x-ruby",
            "xml" => "application/xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "wasm" => "application/wasm",
            "" => "application/octet-stream",
            _ => "text/plain",
        };
        mime.to_string()
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
