//! Code-analysis tools: project overview, regex search, per-file metrics,
//! and refactoring hints.
//!
//! The analysis is line-based. Function boundaries come from the patterns in
//! [`language`](super::language), nesting from brace depth or, for
//! indentation-scoped languages, indent width.

use async_trait::async_trait;
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::filesystem::walk;
use super::language::{comment_prefixes, function_pattern, is_indent_scoped, language_for_path};
use crate::error::{Error, Result};
use crate::mcp::handler::{
    get_bool_arg, get_optional_string_arg, get_string_arg, get_usize_arg, json_result,
    RequestContext, ToolHandler,
};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::service::WorkspaceService;
use crate::tool_schema;

/// Lines longer than this many characters are reported.
pub const LONG_LINE: usize = 120;
/// Functions longer than this many lines are flagged.
pub const LONG_FUNCTION: usize = 50;
/// Nesting deeper than this is flagged.
pub const DEEP_NESTING: usize = 4;

const LARGEST_FILES: usize = 10;
const MIN_DUPLICATE_LEN: usize = 30;
const MIN_DUPLICATE_COUNT: usize = 3;
const MAX_MATCH_TEXT: usize = 200;

/// A function definition and the lines its body spans (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSpan {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl FunctionSpan {
    pub fn lines(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// Line-level analysis of one source file.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SourceAnalysis {
    pub lines: usize,
    pub blank: usize,
    pub comment: usize,
    pub code: usize,
    pub functions: Vec<FunctionSpan>,
    pub max_nesting: usize,
    /// First line reaching `max_nesting`.
    pub max_nesting_line: usize,
    /// Lines longer than [`LONG_LINE`].
    pub long_lines: Vec<usize>,
    /// `(line, text)` of TODO/FIXME/HACK/XXX markers.
    pub markers: Vec<(usize, String)>,
    /// Repeated code lines and where they occur.
    pub duplicates: Vec<(String, Vec<usize>)>,
}

fn marker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(TODO|FIXME|HACK|XXX)\b").ok())
        .as_ref()
}

fn name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:fn|def|defp|function|func|fun)\s*\*?\s+(\w+)|\b(?:const|let)\s+(\w+)\s*=|(\w+)\s*\(").ok()
    })
    .as_ref()
}

/// Best-effort name of the function defined on `line`.
fn function_name(line: &str) -> String {
    const KEYWORDS: &[&str] = &["fn", "def", "function", "func", "fun", "if", "for", "while"];
    let mut fallback = None;
    let Some(re) = name_regex() else {
        return "<anonymous>".to_string();
    };
    for caps in re.captures_iter(line) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            return m.as_str().to_string();
        }
        if let Some(m) = caps.get(3) {
            if !KEYWORDS.contains(&m.as_str()) {
                fallback = Some(m.as_str().to_string());
            }
        }
    }
    fallback.unwrap_or_else(|| "<anonymous>".to_string())
}

/// Apply a line's braces to `depth`, returning the deepest level reached.
/// Braces inside string literals and after a `//` comment are ignored.
fn scan_braces(line: &str, depth: &mut usize) -> usize {
    let mut peak = *depth;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '`' => quote = Some(c),
                '/' if chars.peek() == Some(&'/') => break,
                '{' => {
                    *depth += 1;
                    peak = peak.max(*depth);
                }
                '}' => *depth = depth.saturating_sub(1),
                _ => {}
            },
        }
    }
    peak
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

struct OpenFunction {
    name: String,
    start: usize,
    /// Brace depth before the definition, or the definition's indent.
    base: usize,
    opened: bool,
    last: usize,
}

/// Analyze source text written in `language`.
pub fn analyze_source(content: &str, language: &str) -> SourceAnalysis {
    let prefixes = comment_prefixes(language);
    let pattern = function_pattern(language);
    let indent_scoped = is_indent_scoped(language);
    let block_comments = prefixes.contains(&"/*");

    let mut out = SourceAnalysis::default();
    let mut open: Vec<OpenFunction> = Vec::new();
    let mut depth = 0usize;
    let mut in_block = false;
    let mut seen: HashMap<&str, Vec<usize>> = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let n = idx + 1;
        out.lines += 1;
        let trimmed = raw.trim();

        if raw.chars().count() > LONG_LINE {
            out.long_lines.push(n);
        }
        if marker_regex().is_some_and(|re| re.is_match(raw)) {
            out.markers.push((n, trimmed.chars().take(MAX_MATCH_TEXT).collect()));
        }

        if trimmed.is_empty() {
            out.blank += 1;
            continue;
        }
        if in_block {
            out.comment += 1;
            in_block = !trimmed.contains("*/");
            continue;
        }
        if prefixes.iter().any(|p| trimmed.starts_with(p)) {
            out.comment += 1;
            in_block = block_comments && trimmed.starts_with("/*") && !trimmed.contains("*/");
            continue;
        }
        out.code += 1;

        if trimmed.len() >= MIN_DUPLICATE_LEN {
            seen.entry(trimmed).or_default().push(n);
        }

        let is_definition = pattern.is_some_and(|re| re.is_match(raw));

        if indent_scoped {
            let indent = indent_width(raw);
            while let Some(top) = open.last() {
                if indent > top.base {
                    break;
                }
                if let Some(f) = open.pop() {
                    out.functions.push(FunctionSpan { name: f.name, start_line: f.start, end_line: f.last });
                }
            }
            for f in open.iter_mut() {
                f.last = n;
            }
            if is_definition {
                open.push(OpenFunction { name: function_name(raw), start: n, base: indent, opened: true, last: n });
            }
            let level = indent / 4;
            if level > out.max_nesting {
                out.max_nesting = level;
                out.max_nesting_line = n;
            }
            continue;
        }

        if is_definition {
            open.push(OpenFunction { name: function_name(raw), start: n, base: depth, opened: false, last: n });
        }
        let peak = scan_braces(raw, &mut depth);
        if peak > out.max_nesting {
            out.max_nesting = peak;
            out.max_nesting_line = n;
        }
        if let Some(top) = open.last_mut() {
            top.opened |= peak > top.base;
        }
        while let Some(top) = open.last() {
            if top.opened && depth <= top.base {
                if let Some(f) = open.pop() {
                    out.functions.push(FunctionSpan { name: f.name, start_line: f.start, end_line: n });
                }
            } else if !top.opened && trimmed.ends_with(';') {
                // Declaration without a body.
                open.pop();
            } else {
                break;
            }
        }
    }

    // Indentation-scoped bodies run to the end of the file.
    while let Some(f) = open.pop() {
        if indent_scoped {
            out.functions.push(FunctionSpan { name: f.name, start_line: f.start, end_line: f.last });
        }
    }
    out.functions.sort_by_key(|f| f.start_line);

    let mut duplicates: Vec<(String, Vec<usize>)> = seen
        .into_iter()
        .filter(|(_, lines)| lines.len() >= MIN_DUPLICATE_COUNT)
        .map(|(text, lines)| (text.to_string(), lines))
        .collect();
    duplicates.sort_by_key(|(_, lines)| lines[0]);
    out.duplicates = duplicates;
    out
}

/// Read a workspace file for analysis, rejecting directories and oversized files.
async fn read_source(workspace: &WorkspaceService, shown: &str) -> Result<(PathBuf, String)> {
    let path = workspace.resolve(shown)?;
    let metadata = fs::metadata(&path)
        .await
        .map_err(|_| Error::FileNotFound(shown.to_string()))?;
    if metadata.is_dir() {
        return Err(Error::InvalidPath(format!("{} is a directory", shown)));
    }
    if metadata.len() > workspace.max_file_size() {
        return Err(Error::FileTooLarge { path: shown.to_string(), size: metadata.len() });
    }
    let bytes = fs::read(&path).await?;
    let content = String::from_utf8(bytes)
        .map_err(|_| Error::InvalidPath(format!("{} is not a UTF-8 text file", shown)))?;
    Ok((path, content))
}

async fn files_under(base: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        walk(&base, usize::MAX, false)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    })
    .await
    .map_err(|e| Error::Internal(e.to_string()))
}

// ===== analyze_project =====

#[derive(Debug, Default, Serialize)]
struct LanguageSummary {
    files: usize,
    lines: usize,
}

#[derive(Debug, Serialize)]
struct FileSize {
    path: String,
    size: u64,
}

/// Summarize the files under a directory.
pub struct AnalyzeProjectTool {
    workspace: Arc<WorkspaceService>,
}

impl AnalyzeProjectTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for AnalyzeProjectTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "analyze_project".to_string(),
            description: "Overview of a project: file and line counts per language, totals, and the largest files. Reports progress when the request carries a progress token.".to_string(),
            input_schema: tool_schema! {
                "path": { "type": "string", "description": "Directory to analyze (default: workspace root)" }
            },
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let ctx = RequestContext::new(crate::mcp::protocol::RequestId::Number(0));
        self.execute_with_context(args, &ctx).await
    }

    async fn execute_with_context(
        &self,
        args: HashMap<String, Value>,
        ctx: &RequestContext,
    ) -> Result<ToolResult> {
        let shown = get_optional_string_arg(&args, "path").unwrap_or_else(|| ".".to_string());
        let base = self.workspace.resolve(&shown)?;
        let metadata = fs::metadata(&base)
            .await
            .map_err(|_| Error::FileNotFound(shown.clone()))?;
        if !metadata.is_dir() {
            return Err(Error::InvalidPath(format!("{} is not a directory", shown)));
        }

        let files = files_under(base).await?;
        let total = files.len();
        let progress = ctx.progress(Some(total as u64));
        let step = (total / 20).max(1);

        let mut languages: BTreeMap<&'static str, LanguageSummary> = BTreeMap::new();
        let mut sizes = Vec::with_capacity(total);
        let mut total_lines = 0usize;
        let mut total_bytes = 0u64;

        for (i, path) in files.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let size = fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            let language = language_for_path(path);
            let lines = if size <= self.workspace.max_file_size() {
                match fs::read(path).await {
                    Ok(bytes) => std::str::from_utf8(&bytes).map(|s| s.lines().count()).unwrap_or(0),
                    Err(e) => {
                        debug!("Skipping {}: {}", path.display(), e);
                        0
                    }
                }
            } else {
                0
            };

            let entry = languages.entry(language).or_default();
            entry.files += 1;
            entry.lines += lines;
            total_lines += lines;
            total_bytes += size;
            sizes.push(FileSize { path: self.workspace.relative(path), size });

            if let Some(p) = &progress {
                if (i + 1) % step == 0 && i + 1 < total {
                    p.report((i + 1) as u64, Some("Scanning files")).await;
                }
            }
        }
        if let Some(p) = &progress {
            p.complete(Some("Analysis complete")).await;
        }

        sizes.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        sizes.truncate(LARGEST_FILES);

        json_result(&json!({
            "path": shown,
            "total_files": total,
            "total_lines": total_lines,
            "total_bytes": total_bytes,
            "languages": languages,
            "largest_files": sizes,
        }))
    }
}

// ===== search_pattern =====

#[derive(Debug, Serialize)]
struct PatternMatch {
    path: String,
    line: usize,
    text: String,
}

struct SearchRequest {
    regex: Regex,
    file_glob: Option<Pattern>,
    max_results: usize,
    max_file_size: u64,
}

fn search_files(
    workspace: &WorkspaceService,
    files: &[PathBuf],
    request: &SearchRequest,
    cancel: &CancellationToken,
) -> Result<(Vec<PatternMatch>, usize, bool)> {
    let mut matches = Vec::new();
    let mut searched = 0;
    for path in files {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(glob) = &request.file_glob {
            let rel = workspace.relative(path);
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if !glob.matches(&rel) && !glob.matches(&name) {
                continue;
            }
        }
        let too_big = std::fs::metadata(path).map(|m| m.len() > request.max_file_size).unwrap_or(true);
        if too_big {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        searched += 1;
        for (idx, line) in content.lines().enumerate() {
            if request.regex.is_match(line) {
                if matches.len() >= request.max_results {
                    return Ok((matches, searched, true));
                }
                matches.push(PatternMatch {
                    path: workspace.relative(path),
                    line: idx + 1,
                    text: line.trim().chars().take(MAX_MATCH_TEXT).collect(),
                });
            }
        }
    }
    Ok((matches, searched, false))
}

/// Regex search over file contents.
pub struct SearchPatternTool {
    workspace: Arc<WorkspaceService>,
}

impl SearchPatternTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for SearchPatternTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "search_pattern".to_string(),
            description: "Search file contents with a regular expression. Returns matching lines with their file and line number.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "minLength": 1, "description": "Regular expression" },
                    "path": { "type": "string", "description": "File or directory to search (default: workspace root)" },
                    "file_glob": { "type": "string", "description": "Only search files matching this glob, e.g. '*.rs'" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 10000, "description": "Maximum matches (default: 100)" },
                    "case_insensitive": { "type": "boolean", "description": "Ignore case (default: false)" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let ctx = RequestContext::new(crate::mcp::protocol::RequestId::Number(0));
        self.execute_with_context(args, &ctx).await
    }

    async fn execute_with_context(
        &self,
        args: HashMap<String, Value>,
        ctx: &RequestContext,
    ) -> Result<ToolResult> {
        let raw = get_string_arg(&args, "pattern")?;
        let shown = get_optional_string_arg(&args, "path").unwrap_or_else(|| ".".to_string());
        let regex = RegexBuilder::new(&raw)
            .case_insensitive(get_bool_arg(&args, "case_insensitive", false))
            .size_limit(1 << 20)
            .build()
            .map_err(|e| Error::InvalidToolArguments(format!("Invalid regex '{}': {}", raw, e)))?;
        let file_glob = get_optional_string_arg(&args, "file_glob")
            .map(|g| {
                Pattern::new(&g)
                    .map_err(|e| Error::InvalidToolArguments(format!("Invalid glob '{}': {}", g, e)))
            })
            .transpose()?;

        let base = self.workspace.resolve(&shown)?;
        let metadata = fs::metadata(&base)
            .await
            .map_err(|_| Error::FileNotFound(shown.clone()))?;
        let files = if metadata.is_dir() {
            files_under(base).await?
        } else {
            vec![base]
        };

        let request = SearchRequest {
            regex,
            file_glob,
            max_results: get_usize_arg(&args, "max_results", 100),
            max_file_size: self.workspace.max_file_size(),
        };
        let workspace = self.workspace.clone();
        let cancel = ctx.cancellation.clone();
        let (matches, files_searched, truncated) = tokio::task::spawn_blocking(move || {
            search_files(&workspace, &files, &request, &cancel)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))??;

        json_result(&json!({
            "pattern": raw,
            "matches": matches,
            "files_searched": files_searched,
            "truncated": truncated,
        }))
    }
}

// ===== code_metrics =====

/// Size and complexity metrics for one file.
pub struct CodeMetricsTool {
    workspace: Arc<WorkspaceService>,
}

impl CodeMetricsTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for CodeMetricsTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "code_metrics".to_string(),
            description: "Metrics for a source file: total, blank, comment and code lines, function count, maximum nesting depth, and lines over 120 characters.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1, "description": "File path relative to the workspace root" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_string_arg(&args, "path")?;
        let (path, content) = read_source(&self.workspace, &shown).await?;
        let language = language_for_path(&path);
        let analysis = analyze_source(&content, language);

        let longest = analysis.functions.iter().max_by_key(|f| f.lines()).map(|f| {
            json!({ "name": f.name, "line": f.start_line, "lines": f.lines() })
        });

        json_result(&json!({
            "path": self.workspace.relative(&path),
            "language": language,
            "lines": analysis.lines,
            "blank": analysis.blank,
            "comment": analysis.comment,
            "code": analysis.code,
            "functions": analysis.functions.len(),
            "max_nesting": analysis.max_nesting,
            "long_lines": analysis.long_lines.len(),
            "longest_function": longest,
        }))
    }
}

// ===== suggest_refactor =====

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub kind: &'static str,
    pub line: usize,
    pub message: String,
}

/// Turn an analysis into refactoring suggestions, ordered by line.
pub fn suggestions(analysis: &SourceAnalysis) -> Vec<Suggestion> {
    let mut out = Vec::new();

    for f in &analysis.functions {
        if f.lines() > LONG_FUNCTION {
            out.push(Suggestion {
                kind: "long_function",
                line: f.start_line,
                message: format!(
                    "Function '{}' is {} lines long; consider splitting it (limit {})",
                    f.name,
                    f.lines(),
                    LONG_FUNCTION
                ),
            });
        }
    }
    if analysis.max_nesting > DEEP_NESTING {
        out.push(Suggestion {
            kind: "deep_nesting",
            line: analysis.max_nesting_line,
            message: format!(
                "Nesting reaches depth {}; consider early returns or extracting helpers",
                analysis.max_nesting
            ),
        });
    }
    if let Some(&first) = analysis.long_lines.first() {
        out.push(Suggestion {
            kind: "long_line",
            line: first,
            message: format!(
                "{} line(s) exceed {} characters",
                analysis.long_lines.len(),
                LONG_LINE
            ),
        });
    }
    for (line, text) in &analysis.markers {
        out.push(Suggestion {
            kind: "todo",
            line: *line,
            message: format!("Unresolved marker: {}", text),
        });
    }
    for (text, lines) in &analysis.duplicates {
        let shown: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        out.push(Suggestion {
            kind: "duplicate",
            line: lines[0],
            message: format!(
                "Line repeated {} times (lines {}): {}",
                lines.len(),
                shown.join(", "),
                text.chars().take(80).collect::<String>()
            ),
        });
    }

    out.sort_by_key(|s| s.line);
    out
}

/// Heuristic refactoring hints for one file.
pub struct SuggestRefactorTool {
    workspace: Arc<WorkspaceService>,
}

impl SuggestRefactorTool {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolHandler for SuggestRefactorTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "suggest_refactor".to_string(),
            description: "Heuristic refactoring hints for a source file: long functions, deep nesting, long lines, TODO/FIXME markers, and repeated lines.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1, "description": "File path relative to the workspace root" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>) -> Result<ToolResult> {
        let shown = get_string_arg(&args, "path")?;
        let (path, content) = read_source(&self.workspace, &shown).await?;
        let language = language_for_path(&path);
        let found = suggestions(&analyze_source(&content, language));

        json_result(&json!({
            "path": self.workspace.relative(&path),
            "language": language,
            "count": found.len(),
            "suggestions": found,
        }))
    }
}
