//! MCP Prompt Templates
//!
//! Pre-defined prompts that guide AI assistants in common tasks. A prompt is
//! a [`Prompt`] declaration plus a [`PromptGenerator`] that turns argument
//! values into role-tagged messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;

use crate::error::{Error, Result};
use crate::mcp::registry::Registry;
use crate::mcp::resources::ResourceContents;
use crate::service::WorkspaceService;

/// A prompt argument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            required: false,
        }
    }
}

/// A prompt declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

impl Prompt {
    /// Reject invocations that omit a required argument.
    pub fn check_arguments(&self, supplied: &HashMap<String, String>) -> Result<()> {
        match self
            .arguments
            .iter()
            .find(|arg| arg.required && !supplied.contains_key(&arg.name))
        {
            Some(missing) => Err(Error::InvalidParams(format!(
                "Missing required argument '{}' for prompt '{}'",
                missing.name, self.name
            ))),
            None => Ok(()),
        }
    }
}

/// Who a prompt message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A prompt message (the actual content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: PromptContent,
}

impl PromptMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: PromptContent::Text { text: text.into() },
        }
    }
}

/// Prompt content types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    Text { text: String },
    Resource { resource: ResourceContents },
}

/// Result of prompts/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Params of prompts/get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptParams {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Result of prompts/get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// Turns argument values into prompt messages. Required arguments have been
/// checked before `generate` is called.
#[async_trait]
pub trait PromptGenerator: Send + Sync {
    async fn generate(&self, arguments: &HashMap<String, String>) -> Result<Vec<PromptMessage>>;
}

/// Generator rendering a single user message from a text template.
///
/// Supports `{{var}}` substitution and `{{#if var}}...{{/if}}` blocks, which
/// are kept only when `var` is present and non-empty. Conditionals do not nest.
#[derive(Debug, Clone)]
pub struct TemplatePrompt {
    pub template: String,
}

impl TemplatePrompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, arguments: &HashMap<String, String>) -> String {
        render(&self.template, arguments)
    }
}

#[async_trait]
impl PromptGenerator for TemplatePrompt {
    async fn generate(&self, arguments: &HashMap<String, String>) -> Result<Vec<PromptMessage>> {
        Ok(vec![PromptMessage::user_text(self.render(arguments))])
    }
}

const IF_END: &str = "{{/if}}";

fn is_set(arguments: &HashMap<String, String>, name: &str) -> bool {
    arguments.get(name).is_some_and(|v| !v.is_empty())
}

fn render(template: &str, arguments: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if let Some(var) = tag.strip_prefix("#if ") {
            let (body, remainder) = match rest.find(IF_END) {
                Some(i) => (&rest[..i], &rest[i + IF_END.len()..]),
                None => (rest, ""),
            };
            if is_set(arguments, var.trim()) {
                out.push_str(&render(body, arguments));
            }
            rest = remainder;
        } else if tag != "/if" {
            if let Some(value) = arguments.get(tag) {
                out.push_str(value);
            }
        }
    }

    out.push_str(rest);
    out
}

/// `review_file`: embeds a workspace file and asks for a review of it.
pub struct ReviewFilePrompt {
    workspace: Arc<WorkspaceService>,
    instructions: TemplatePrompt,
}

impl ReviewFilePrompt {
    pub fn new(workspace: Arc<WorkspaceService>) -> Self {
        Self {
            workspace,
            instructions: TemplatePrompt::new(
                "Please review the file `{{path}}` attached above.\n\
                 {{#if focus}}\nFocus areas: {{focus}}\n{{/if}}\n\
                 Analyze for:\n\
                 1. Potential bugs or errors\n\
                 2. Security vulnerabilities\n\
                 3. Performance issues\n\
                 4. Code style and best practices\n\
                 5. Suggestions for improvement",
            ),
        }
    }

    pub fn prompt() -> Prompt {
        Prompt {
            name: "review_file".to_string(),
            description: Some("Review a workspace file for quality, bugs, and best practices".to_string()),
            arguments: vec![
                PromptArgument::required("path", "Path of the file, relative to the workspace"),
                PromptArgument::optional("focus", "Areas to focus on (security, performance, style)"),
            ],
        }
    }
}

#[async_trait]
impl PromptGenerator for ReviewFilePrompt {
    async fn generate(&self, arguments: &HashMap<String, String>) -> Result<Vec<PromptMessage>> {
        let rel = arguments.get("path").map(String::as_str).unwrap_or_default();
        let path = self.workspace.resolve(rel)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| Error::FileNotFound(rel.to_string()))?;
        if !metadata.is_file() {
            return Err(Error::InvalidParams(format!("Not a file: {}", rel)));
        }
        if metadata.len() > self.workspace.max_file_size() {
            return Err(Error::FileTooLarge {
                path: rel.to_string(),
                size: metadata.len(),
            });
        }

        let text = fs::read_to_string(&path).await?;
        let file = ResourceContents::text(
            WorkspaceService::path_to_file_uri(&path),
            WorkspaceService::guess_mime_type(&path),
            text,
        );

        Ok(vec![
            PromptMessage {
                role: Role::User,
                content: PromptContent::Resource { resource: file },
            },
            PromptMessage::user_text(self.instructions.render(arguments)),
        ])
    }
}

fn explain_code_prompt() -> (Prompt, TemplatePrompt) {
    (
        Prompt {
            name: "explain_code".to_string(),
            description: Some("Explain what a piece of code does".to_string()),
            arguments: vec![
                PromptArgument::required("code", "The code to explain"),
                PromptArgument::optional("language", "Programming language of the code"),
            ],
        },
        TemplatePrompt::new(
            r#"Please explain the following {{#if language}}{{language}} {{/if}}code:

```{{language}}
{{code}}
```

Explain:
1. What the code does overall
2. How it works step by step
3. Any important patterns or techniques used"#,
        ),
    )
}

fn refactor_plan_prompt() -> (Prompt, TemplatePrompt) {
    (
        Prompt {
            name: "refactor_plan".to_string(),
            description: Some("Plan a refactoring of a workspace file".to_string()),
            arguments: vec![
                PromptArgument::required("path", "Path of the file, relative to the workspace"),
                PromptArgument::optional("goal", "What the refactoring should achieve"),
            ],
        },
        TemplatePrompt::new(
            r#"Plan a refactoring of `{{path}}`.
{{#if goal}}
Goal: {{goal}}
{{/if}}
Start by calling the `code_metrics` and `suggest_refactor` tools on the file, then read it with `read_file`.

Produce:
1. The problems worth fixing, most important first
2. A sequence of small, behavior-preserving steps
3. The tests that should pass after each step"#,
        ),
    )
}

/// Register the built-in prompts.
pub fn register_builtin_prompts(registry: &mut Registry, workspace: Arc<WorkspaceService>) -> Result<()> {
    registry.register_prompt(ReviewFilePrompt::prompt(), Arc::new(ReviewFilePrompt::new(workspace)))?;
    for (prompt, template) in [explain_code_prompt(), refactor_plan_prompt()] {
        registry.register_prompt(prompt, Arc::new(template))?;
    }
    Ok(())
}
