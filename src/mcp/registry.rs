//! MCP Tool, Resource and Prompt Registry
//!
//! Manages registration and lookup of everything the server exposes.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use super::context::ToolContext;
use super::protocol::{
    McpError, PromptArgument, PromptDefinition, PromptMessage, ResourceContent,
    ResourceDefinition, ResourceTemplateDefinition, ToolDefinition, ToolsCallResult,
};

// ============================================================================
// Tool Types
// ============================================================================

/// Result type for tool execution
pub type ToolResult = Result<ToolsCallResult, McpError>;

/// Boxed future for async tool execution
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Tool handler function type
pub type ToolHandler = Arc<dyn Fn(ToolContext, Value) -> ToolFuture + Send + Sync>;

/// A registered tool with metadata and handler
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub access: Access,
    pub handler: ToolHandler,
    pub category: ToolCategory,
}

/// Tool category for rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Read,
    Write,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Read => "read",
            ToolCategory::Write => "write",
        }
    }
}

/// Who may see and call an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Requires caller credentials.
    Authenticated,
}

impl Access {
    fn allows(&self, authenticated: bool) -> bool {
        match self {
            Access::Public => true,
            Access::Authenticated => authenticated,
        }
    }
}

// ============================================================================
// Resource Types
// ============================================================================

/// Result type for resource read
pub type ResourceResult = Result<Vec<ResourceContent>, McpError>;

/// Boxed future for async resource read
pub type ResourceFuture = Pin<Box<dyn Future<Output = ResourceResult> + Send>>;

/// A resource read with the values bound to the pattern's `{param}` parts.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub uri: String,
    pub params: HashMap<String, String>,
}

impl ResourceRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Resource handler function type
pub type ResourceHandler = Arc<dyn Fn(ToolContext, ResourceRequest) -> ResourceFuture + Send + Sync>;

/// A registered resource with metadata and handler
pub struct RegisteredResource {
    pub uri_pattern: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub handler: ResourceHandler,
}

impl RegisteredResource {
    /// Patterns with `{param}` parts are listed as templates.
    pub fn is_template(&self) -> bool {
        self.uri_pattern.contains('{')
    }
}

// ============================================================================
// Prompt Types
// ============================================================================

pub type PromptHandler =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Vec<PromptMessage>, McpError> + Send + Sync>;

pub struct RegisteredPrompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub handler: PromptHandler,
}

// ============================================================================
// Registry
// ============================================================================

/// Registry for MCP tools, resources and prompts
pub struct McpRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    resources: Vec<RegisteredResource>,
    prompts: BTreeMap<String, RegisteredPrompt>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            resources: Vec::new(),
            prompts: BTreeMap::new(),
        }
    }

    /// Register a tool
    pub fn register_tool(&mut self, tool: RegisteredTool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Exposes an already registered tool under a second name. The alias
    /// shares the target's handler, schema, access and rate limit category.
    pub fn register_alias(&mut self, alias: &str, target: &str, description: &str) {
        let Some(tool) = self.tools.get(target) else {
            warn!("Cannot alias {} to unknown tool {}", alias, target);
            return;
        };
        let aliased = RegisteredTool {
            name: alias.to_string(),
            description: description.to_string(),
            input_schema: tool.input_schema.clone(),
            access: tool.access,
            handler: tool.handler.clone(),
            category: tool.category,
        };
        self.register_tool(aliased);
    }

    /// Register a resource. Concrete URIs should be registered before
    /// patterns that would also match them.
    pub fn register_resource(&mut self, resource: RegisteredResource) {
        self.resources.push(resource);
    }

    pub fn register_prompt(&mut self, prompt: RegisteredPrompt) {
        self.prompts.insert(prompt.name.clone(), prompt);
    }

    /// Tools visible to a caller, sorted by name
    pub fn get_available_tools(&self, authenticated: bool) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|tool| tool.access.allows(authenticated))
            .map(|tool| ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    /// Get a tool by name, checking access
    pub fn get_tool(&self, name: &str, authenticated: bool) -> Result<&RegisteredTool, McpError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| McpError::MethodNotFound(format!("Unknown tool: {}", name)))?;
        if !tool.access.allows(authenticated) {
            return Err(McpError::PermissionDenied(format!(
                "tool {} requires SAGE credentials",
                name
            )));
        }
        Ok(tool)
    }

    /// Concrete resources
    pub fn get_resources(&self) -> Vec<ResourceDefinition> {
        self.resources
            .iter()
            .filter(|r| !r.is_template())
            .map(|resource| ResourceDefinition {
                uri: resource.uri_pattern.clone(),
                name: resource.name.clone(),
                description: resource.description.clone(),
                mime_type: resource.mime_type.clone(),
            })
            .collect()
    }

    /// Parameterized resources
    pub fn get_resource_templates(&self) -> Vec<ResourceTemplateDefinition> {
        self.resources
            .iter()
            .filter(|r| r.is_template())
            .map(|resource| ResourceTemplateDefinition {
                uri_template: resource.uri_pattern.clone(),
                name: resource.name.clone(),
                description: resource.description.clone(),
                mime_type: resource.mime_type.clone(),
            })
            .collect()
    }

    /// Find a resource handler for a URI, binding pattern parameters
    pub fn find_resource(&self, uri: &str) -> Option<(&RegisteredResource, ResourceRequest)> {
        self.resources.iter().find_map(|resource| {
            match_uri_pattern(&resource.uri_pattern, uri).map(|params| {
                (
                    resource,
                    ResourceRequest {
                        uri: uri.to_string(),
                        params,
                    },
                )
            })
        })
    }

    pub fn get_prompts(&self) -> Vec<PromptDefinition> {
        self.prompts
            .values()
            .map(|prompt| PromptDefinition {
                name: prompt.name.clone(),
                description: prompt.description.clone(),
                arguments: prompt.arguments.clone(),
            })
            .collect()
    }

    pub fn get_prompt(&self, name: &str) -> Option<&RegisteredPrompt> {
        self.prompts.get(name)
    }

    /// Get the number of registered tools
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Get the number of registered resources
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }
}

impl Default for McpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Matches a URI against a pattern with `{param}` placeholders and returns
/// the percent-decoded parameter values.
fn match_uri_pattern(pattern: &str, uri: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();

    if pattern_parts.len() != uri_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pattern_part, uri_part) in pattern_parts.iter().zip(uri_parts.iter()) {
        if let Some(name) = pattern_part
            .strip_prefix('{')
            .and_then(|p| p.strip_suffix('}'))
        {
            if uri_part.is_empty() {
                return None;
            }
            let value = urlencoding::decode(uri_part)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| uri_part.to_string());
            params.insert(name.to_string(), value);
        } else if pattern_part != uri_part {
            return None;
        }
    }

    Some(params)
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for registering a tool
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: Value,
    access: Access,
    category: ToolCategory,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            access: Access::Public,
            category: ToolCategory::Read,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn category(mut self, cat: ToolCategory) -> Self {
        self.category = cat;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredTool
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        RegisteredTool {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            access: self.access,
            category: self.category,
            handler: Arc::new(move |ctx, params| Box::pin(handler(ctx, params))),
        }
    }
}

/// Builder for registering a resource
pub struct ResourceBuilder {
    uri_pattern: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
}

impl ResourceBuilder {
    pub fn new(uri_pattern: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri_pattern: uri_pattern.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredResource
    where
        F: Fn(ToolContext, ResourceRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResourceResult> + Send + 'static,
    {
        RegisteredResource {
            uri_pattern: self.uri_pattern,
            name: self.name,
            description: self.description,
            mime_type: self.mime_type,
            handler: Arc::new(move |ctx, request| Box::pin(handler(ctx, request))),
        }
    }
}

/// Builder for registering a prompt
pub struct PromptBuilder {
    name: String,
    description: String,
    arguments: Vec<PromptArgument>,
}

impl PromptBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn argument(mut self, name: &str, description: &str, required: bool) -> Self {
        self.arguments.push(PromptArgument {
            name: name.to_string(),
            description: description.to_string(),
            required,
        });
        self
    }

    pub fn build<F>(self, handler: F) -> RegisteredPrompt
    where
        F: Fn(&Map<String, Value>) -> Result<Vec<PromptMessage>, McpError> + Send + Sync + 'static,
    {
        RegisteredPrompt {
            name: self.name,
            description: self.description,
            arguments: self.arguments,
            handler: Arc::new(handler),
        }
    }
}
