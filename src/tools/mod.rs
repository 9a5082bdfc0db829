//! Reference tools, resources, and prompts served over MCP.
//!
//! - `filesystem` - read, write, list, search, stat, and delete (6 tools)
//! - `analysis` - project overview, regex search, metrics, refactor hints (4 tools)
//! - `language` - language detection shared by the analysis tools

pub mod analysis;
pub mod filesystem;
pub mod language;

use std::sync::Arc;

use crate::error::Result;
use crate::mcp::prompts::register_builtin_prompts;
use crate::mcp::registry::Registry;
use crate::mcp::resources::{FileResource, WorkspaceInfoResource};
use crate::service::WorkspaceService;

/// Register every tool, resource, and prompt against `workspace`.
///
/// Tools that modify the workspace are left out in read-only mode.
pub fn register_all(registry: &mut Registry, workspace: Arc<WorkspaceService>) -> Result<()> {
    // Filesystem tools
    registry.register_tool(filesystem::ReadFileTool::new(workspace.clone()))?;
    if !workspace.is_read_only() {
        registry.register_tool(filesystem::WriteFileTool::new(workspace.clone()))?;
    }
    registry.register_tool(filesystem::ListDirectoryTool::new(workspace.clone()))?;
    registry.register_tool(filesystem::SearchFilesTool::new(workspace.clone()))?;
    registry.register_tool(filesystem::GetFileInfoTool::new(workspace.clone()))?;
    if !workspace.is_read_only() {
        registry.register_tool(filesystem::DeleteFileTool::new(workspace.clone()))?;
    }

    // Analysis tools
    registry.register_tool(analysis::AnalyzeProjectTool::new(workspace.clone()))?;
    registry.register_tool(analysis::SearchPatternTool::new(workspace.clone()))?;
    registry.register_tool(analysis::CodeMetricsTool::new(workspace.clone()))?;
    registry.register_tool(analysis::SuggestRefactorTool::new(workspace.clone()))?;

    // Resources
    registry.register_resource(
        WorkspaceInfoResource::resource(),
        Arc::new(WorkspaceInfoResource::new(workspace.clone())),
    )?;
    registry.register_resource_template(
        FileResource::template(),
        Arc::new(FileResource::new(workspace.clone())),
    )?;

    register_builtin_prompts(registry, workspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(registry: &Registry) -> Vec<String> {
        registry.list_tools().into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_register_all() {
        let dir = TempDir::new().unwrap();
        let workspace = Arc::new(WorkspaceService::new(dir.path()).unwrap());
        let mut registry = Registry::new();
        register_all(&mut registry, workspace).unwrap();

        assert_eq!(
            names(&registry),
            vec![
                "read_file",
                "write_file",
                "list_directory",
                "search_files",
                "get_file_info",
                "delete_file",
                "analyze_project",
                "search_pattern",
                "code_metrics",
                "suggest_refactor",
            ]
        );
        assert_eq!(registry.list_resources().len(), 1);
        assert_eq!(registry.list_resource_templates().len(), 1);
        assert_eq!(registry.list_prompts().len(), 3);

        let caps = registry.server_capabilities();
        assert!(caps.tools.is_some());
        assert!(caps.resources.is_some());
        assert!(caps.prompts.is_some());
    }

    #[test]
    fn test_read_only_omits_mutating_tools() {
        let dir = TempDir::new().unwrap();
        let workspace = Arc::new(
            WorkspaceService::new(dir.path())
                .unwrap()
                .with_read_only(true),
        );
        let mut registry = Registry::new();
        register_all(&mut registry, workspace).unwrap();

        let names = names(&registry);
        assert!(!names.contains(&"write_file".to_string()));
        assert!(!names.contains(&"delete_file".to_string()));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let workspace = Arc::new(WorkspaceService::new(dir.path()).unwrap());
        let mut registry = Registry::new();
        register_all(&mut registry, workspace.clone()).unwrap();
        assert!(register_all(&mut registry, workspace).is_err());
    }
}
