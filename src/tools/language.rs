//! Language classification for the analysis tools.
//!
//! Maps files to a language, and a language to the comment markers and
//! function-definition pattern the line-based heuristics need.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Maps a file extension to a canonical language identifier.
///
/// # Examples
///
/// ```
/// use workspace_mcp::tools::language::extension_to_language;
/// assert_eq!(extension_to_language("rs"), "rust");
/// assert_eq!(extension_to_language("py"), "python");
/// assert_eq!(extension_to_language("unknown"), "other");
/// ```
pub fn extension_to_language(ext: &str) -> &'static str {
    match ext {
        // Systems programming
        "rs" => "rust",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "cpp",
        "go" => "go",
        "zig" => "zig",

        // Dynamic/scripting
        "py" | "pyi" | "pyw" => "python",
        "rb" | "rake" | "gemspec" => "ruby",
        "php" | "phtml" => "php",
        "lua" => "lua",
        "sh" | "bash" | "zsh" | "fish" | "ksh" => "shell",

        // JVM / .NET
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" | "sc" => "scala",
        "cs" => "csharp",

        // Web languages
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "mts" | "cts" | "tsx" => "typescript",
        "vue" => "vue",
        "html" | "htm" | "xhtml" => "html",
        "css" | "scss" | "sass" | "less" => "css",

        // Mobile
        "swift" => "swift",
        "dart" => "dart",

        // Functional languages
        "hs" | "lhs" => "haskell",
        "ex" | "exs" => "elixir",
        "clj" | "cljs" | "cljc" => "clojure",

        // Data/Config
        "json" | "jsonc" | "json5" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" | "xsd" | "xsl" => "xml",
        "ini" | "cfg" | "conf" => "config",

        // Query/Markup
        "sql" => "sql",
        "md" | "markdown" | "mdx" => "markdown",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        "tf" | "tfvars" | "hcl" => "terraform",

        _ => "other",
    }
}

/// Maps an extensionless filename to a language category.
pub fn filename_to_language(name: &str) -> Option<&'static str> {
    match name {
        "Makefile" | "makefile" | "GNUmakefile" => Some("make"),
        "CMakeLists.txt" => Some("cmake"),
        "Rakefile" | "Gemfile" | "Vagrantfile" => Some("ruby"),
        "Dockerfile" | "Containerfile" => Some("docker"),
        "Jenkinsfile" => Some("groovy"),
        ".bashrc" | ".bash_profile" | ".zshrc" | ".profile" => Some("shell"),
        _ => None,
    }
}

/// Language of a path, from its extension or, failing that, its file name.
pub fn language_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extension_to_language(&ext.to_ascii_lowercase()),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(filename_to_language)
            .unwrap_or("other"),
    }
}

/// Whether the language is code (as opposed to data, config, or prose).
pub fn is_code(language: &str) -> bool {
    !matches!(
        language,
        "other" | "json" | "yaml" | "toml" | "xml" | "config" | "markdown" | "html" | "css"
    )
}

/// Line-comment prefixes for a language.
pub fn comment_prefixes(language: &str) -> &'static [&'static str] {
    match language {
        "python" | "ruby" | "shell" | "yaml" | "toml" | "make" | "docker" | "elixir"
        | "terraform" | "config" => &["#"],
        "sql" | "haskell" | "lua" => &["--"],
        "clojure" => &[";"],
        "php" => &["//", "#"],
        "html" | "xml" | "markdown" | "json" | "other" => &[],
        _ => &["//", "/*", "*", "*/"],
    }
}

/// Whether blocks are delimited by indentation rather than braces.
pub fn is_indent_scoped(language: &str) -> bool {
    matches!(language, "python" | "yaml" | "haskell")
}

fn function_pattern_source(language: &str) -> &'static str {
    match language {
        "rust" => r"^\s*(pub(\([^)]*\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+",
        "python" => r"^\s*(async\s+)?def\s+\w+",
        "typescript" | "javascript" => {
            r"^\s*(export\s+)?(default\s+)?(async\s+)?function\s*\*?\s*\w+|^\s*(export\s+)?(const|let)\s+\w+\s*=\s*(async\s+)?(\([^)]*\)|\w+)\s*=>"
        }
        "go" => r"^\s*func\s+(\([^)]*\)\s*)?\w+",
        "java" | "csharp" | "kotlin" | "scala" => {
            r"^\s*((public|private|protected|internal|static|final|abstract|override|suspend|async)\s+)*(fun\s+|def\s+)?[\w<>\[\],.?]+\s+\w+\s*\([^;]*$|^\s*(fun|def)\s+\w+"
        }
        "ruby" | "elixir" => r"^\s*(def|defp)\s+\w+",
        "php" => r"^\s*((public|private|protected|static)\s+)*function\s+\w+",
        "swift" => r"^\s*((public|private|internal|static|override)\s+)*func\s+\w+",
        "shell" => r"^\s*(function\s+\w+|\w+\s*\(\)\s*\{)",
        "c" | "cpp" => r"^[\w*&:<>]+(\s+[\w*&:<>]+)*\s+\**\w+(::\w+)?\s*\([^;]*$",
        _ => r"^\s*(fn|def|function|func)\s+\w+",
    }
}

/// Pattern matching the first line of a function definition.
pub fn function_pattern(language: &str) -> Option<&'static Regex> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    const LANGUAGES: &[&str] = &[
        "rust", "python", "typescript", "javascript", "go", "java", "csharp", "kotlin", "scala",
        "ruby", "elixir", "php", "swift", "shell", "c", "cpp", "default",
    ];

    let patterns = PATTERNS.get_or_init(|| {
        LANGUAGES
            .iter()
            .filter_map(|lang| {
                Regex::new(function_pattern_source(lang))
                    .ok()
                    .map(|re| (*lang, re))
            })
            .collect()
    });

    if !is_code(language) {
        return None;
    }
    let key = if LANGUAGES.contains(&language) {
        language
    } else {
        "default"
    };
    patterns.iter().find(|(l, _)| *l == key).map(|(_, re)| re)
}
