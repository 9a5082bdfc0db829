//! Capability registry.
//!
//! Holds the tools, resources, resource templates, and prompts a server
//! offers. It is filled once at startup and shared read-only (behind an
//! `Arc`) by every session afterwards. Lists come back in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mcp::handler::ToolHandler;
use crate::mcp::prompts::{Prompt, PromptGenerator};
use crate::mcp::protocol::{
    PromptsCapability, ResourcesCapability, ServerCapabilities, Tool, ToolsCapability,
};
use crate::mcp::resources::{Resource, ResourceReader, ResourceTemplate, UriTemplate};

struct ToolEntry {
    definition: Tool,
    handler: Arc<dyn ToolHandler>,
}

struct ResourceEntry {
    resource: Resource,
    reader: Arc<dyn ResourceReader>,
}

struct TemplateEntry {
    template: ResourceTemplate,
    matcher: UriTemplate,
    reader: Arc<dyn ResourceReader>,
}

struct PromptEntry {
    prompt: Prompt,
    generator: Arc<dyn PromptGenerator>,
}

/// A registered tool, as handed to the dispatcher.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

/// A resource URI resolved to its reader.
#[derive(Clone)]
pub struct ResolvedResource {
    pub uri: String,
    pub variables: HashMap<String, String>,
    pub reader: Arc<dyn ResourceReader>,
}

/// Tools, resources, and prompts offered by a server.
#[derive(Default)]
pub struct Registry {
    tools: Vec<ToolEntry>,
    tool_index: HashMap<String, usize>,
    resources: Vec<ResourceEntry>,
    resource_index: HashMap<String, usize>,
    templates: Vec<TemplateEntry>,
    prompts: Vec<PromptEntry>,
    prompt_index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name exists.
    pub fn register_tool<H: ToolHandler + 'static>(&mut self, handler: H) -> Result<()> {
        self.register_tool_arc(Arc::new(handler))
    }

    pub fn register_tool_arc(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let definition = handler.definition();
        if self.tool_index.contains_key(&definition.name) {
            return Err(Error::duplicate("tool", definition.name));
        }
        self.tool_index
            .insert(definition.name.clone(), self.tools.len());
        self.tools.push(ToolEntry {
            definition,
            handler,
        });
        Ok(())
    }

    /// Register a static resource. Fails if the URI is already registered.
    pub fn register_resource(
        &mut self,
        resource: Resource,
        reader: Arc<dyn ResourceReader>,
    ) -> Result<()> {
        if self.resource_index.contains_key(&resource.uri) {
            return Err(Error::duplicate("resource", resource.uri));
        }
        self.resource_index
            .insert(resource.uri.clone(), self.resources.len());
        self.resources.push(ResourceEntry { resource, reader });
        Ok(())
    }

    /// Register a resource template. Fails if the template does not parse or
    /// an identical template is already registered.
    pub fn register_resource_template(
        &mut self,
        template: ResourceTemplate,
        reader: Arc<dyn ResourceReader>,
    ) -> Result<()> {
        if self
            .templates
            .iter()
            .any(|t| t.template.uri_template == template.uri_template)
        {
            return Err(Error::duplicate("resource template", template.uri_template));
        }
        let matcher = UriTemplate::parse(&template.uri_template)?;
        self.templates.push(TemplateEntry {
            template,
            matcher,
            reader,
        });
        Ok(())
    }

    /// Register a prompt. Fails if a prompt with the same name exists.
    pub fn register_prompt(
        &mut self,
        prompt: Prompt,
        generator: Arc<dyn PromptGenerator>,
    ) -> Result<()> {
        if self.prompt_index.contains_key(&prompt.name) {
            return Err(Error::duplicate("prompt", prompt.name));
        }
        self.prompt_index
            .insert(prompt.name.clone(), self.prompts.len());
        self.prompts.push(PromptEntry { prompt, generator });
        Ok(())
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|e| e.definition.clone()).collect()
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources.iter().map(|e| e.resource.clone()).collect()
    }

    pub fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.templates.iter().map(|e| e.template.clone()).collect()
    }

    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts.iter().map(|e| e.prompt.clone()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn get_tool(&self, name: &str) -> Option<RegisteredTool> {
        self.tool_index.get(name).map(|&i| RegisteredTool {
            definition: self.tools[i].definition.clone(),
            handler: self.tools[i].handler.clone(),
        })
    }

    pub fn get_prompt(&self, name: &str) -> Option<(Prompt, Arc<dyn PromptGenerator>)> {
        self.prompt_index
            .get(name)
            .map(|&i| (self.prompts[i].prompt.clone(), self.prompts[i].generator.clone()))
    }

    /// Resolve a URI: an exact static match wins, otherwise the first
    /// registered template that matches.
    pub fn resolve_resource(&self, uri: &str) -> Result<ResolvedResource> {
        if let Some(&i) = self.resource_index.get(uri) {
            return Ok(ResolvedResource {
                uri: uri.to_string(),
                variables: HashMap::new(),
                reader: self.resources[i].reader.clone(),
            });
        }

        self.templates
            .iter()
            .find_map(|entry| {
                entry.matcher.matches(uri).map(|variables| ResolvedResource {
                    uri: uri.to_string(),
                    variables,
                    reader: entry.reader.clone(),
                })
            })
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))
    }

    /// Capabilities served by this registry. Families with nothing
    /// registered are not advertised.
    pub fn server_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            resources: (!self.resources.is_empty() || !self.templates.is_empty())
                .then(ResourcesCapability::default),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
            logging: None,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tool_index.len())
            .field("resources", &self.resources.len())
            .field("templates", &self.templates.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::success_result;
    use crate::mcp::prompts::TemplatePrompt;
    use crate::mcp::protocol::ToolResult;
    use crate::mcp::resources::ResourceContents;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NamedTool(&'static str);

    #[async_trait]
    impl ToolHandler for NamedTool {
        fn definition(&self) -> Tool {
            Tool {
                name: self.0.to_string(),
                description: "test".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(&self, _args: HashMap<String, Value>) -> Result<ToolResult> {
            Ok(success_result(self.0))
        }
    }

    struct Labelled(&'static str);

    #[async_trait]
    impl ResourceReader for Labelled {
        async fn read(&self, uri: &str, variables: &HashMap<String, String>) -> Result<ResourceContents> {
            let mut vars: Vec<_> = variables.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            vars.sort();
            Ok(ResourceContents::text(
                uri,
                "text/plain",
                format!("{}:{}", self.0, vars.join(",")),
            ))
        }
    }

    fn resource(uri: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: uri.to_string(),
            description: None,
            mime_type: None,
        }
    }

    fn template(pattern: &str) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: pattern.to_string(),
            name: pattern.to_string(),
            description: None,
            mime_type: None,
        }
    }

    fn prompt(name: &str) -> Prompt {
        Prompt {
            name: name.to_string(),
            description: None,
            arguments: vec![],
        }
    }

    async fn read(registry: &Registry, uri: &str) -> String {
        let resolved = registry.resolve_resource(uri).unwrap();
        resolved
            .reader
            .read(&resolved.uri, &resolved.variables)
            .await
            .unwrap()
            .text
            .unwrap()
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut registry = Registry::new();
        registry.register_tool(NamedTool("read_file")).unwrap();
        let err = registry.register_tool(NamedTool("read_file")).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { kind: "tool", .. }));
        assert_eq!(registry.tool_count(), 1);
    }

    #[test]
    fn test_duplicate_resource_and_prompt_rejected() {
        let mut registry = Registry::new();
        registry
            .register_resource(resource("a://x"), Arc::new(Labelled("a")))
            .unwrap();
        assert!(registry
            .register_resource(resource("a://x"), Arc::new(Labelled("b")))
            .is_err());

        registry
            .register_prompt(prompt("p"), Arc::new(TemplatePrompt::new("x")))
            .unwrap();
        assert!(registry
            .register_prompt(prompt("p"), Arc::new(TemplatePrompt::new("y")))
            .is_err());

        registry
            .register_resource_template(template("a://{id}"), Arc::new(Labelled("t")))
            .unwrap();
        assert!(registry
            .register_resource_template(template("a://{id}"), Arc::new(Labelled("t")))
            .is_err());
        assert!(registry
            .register_resource_template(template("a://{bad"), Arc::new(Labelled("t")))
            .is_err());
    }

    #[test]
    fn test_lists_preserve_registration_order() {
        let mut registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register_tool(NamedTool(name)).unwrap();
            registry
                .register_prompt(prompt(name), Arc::new(TemplatePrompt::new("")))
                .unwrap();
        }
        let tools: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(tools, vec!["zeta", "alpha", "mid"]);
        let prompts: Vec<_> = registry.list_prompts().into_iter().map(|p| p.name).collect();
        assert_eq!(prompts, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_static_resource_wins_over_template() {
        let mut registry = Registry::new();
        registry
            .register_resource_template(template("notes://{id}"), Arc::new(Labelled("template")))
            .unwrap();
        registry
            .register_resource(resource("notes://pinned"), Arc::new(Labelled("static")))
            .unwrap();

        assert_eq!(read(&registry, "notes://pinned").await, "static:");
        assert_eq!(read(&registry, "notes://other").await, "template:id=other");
    }

    #[tokio::test]
    async fn test_first_matching_template_wins() {
        let mut registry = Registry::new();
        registry
            .register_resource_template(template("x://{+rest}"), Arc::new(Labelled("first")))
            .unwrap();
        registry
            .register_resource_template(template("x://{one}"), Arc::new(Labelled("second")))
            .unwrap();
        assert_eq!(read(&registry, "x://a").await, "first:rest=a");
    }

    #[test]
    fn test_unresolvable_resource() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve_resource("nothing://here"),
            Err(Error::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_capabilities_follow_registrations() {
        let mut registry = Registry::new();
        assert_eq!(registry.server_capabilities(), ServerCapabilities::default());

        registry.register_tool(NamedTool("t")).unwrap();
        registry
            .register_resource_template(template("f://{+p}"), Arc::new(Labelled("f")))
            .unwrap();
        let caps = registry.server_capabilities();
        assert!(caps.tools.is_some());
        assert!(caps.resources.is_some());
        assert!(caps.prompts.is_none());
        assert!(caps.logging.is_none());
    }
}
