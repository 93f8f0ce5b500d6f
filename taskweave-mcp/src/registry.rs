//! Capability registry
//!
//! Tools, resources and prompts are registered once during bootstrap and then
//! shared read-only with the protocol engine. Entries are kept in ordered maps
//! so list results come back sorted by key. Registering a name that already
//! exists replaces the earlier entry.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{
    Prompt, PromptArgument, PromptsCapability, Resource, ResourcesCapability, ServerCapabilities,
    Tool, ToolsCapability,
};

/// Callable behind a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value>;
}

/// Producer of a resource's text content
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self) -> Result<String>;
}

/// Builder of a prompt's message list
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, arguments: Value) -> Result<Value>;
}

/// Adapter for synchronous closures
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> Result<Value> {
        (self.0)(arguments)
    }
}

#[async_trait]
impl<F> PromptHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    async fn get(&self, arguments: Value) -> Result<Value> {
        (self.0)(arguments)
    }
}

/// Adapter for synchronous resource producers
pub struct FnResource<F>(pub F);

#[async_trait]
impl<F> ResourceHandler for FnResource<F>
where
    F: Fn() -> Result<String> + Send + Sync,
{
    async fn read(&self) -> Result<String> {
        (self.0)()
    }
}

#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

#[derive(Clone)]
pub struct RegisteredResource {
    pub definition: Resource,
    pub handler: Arc<dyn ResourceHandler>,
}

#[derive(Clone)]
pub struct RegisteredPrompt {
    pub definition: Prompt,
    pub handler: Arc<dyn PromptHandler>,
}

#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    resources: BTreeMap<String, RegisteredResource>,
    prompts: BTreeMap<String, RegisteredPrompt>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool<H: ToolHandler + 'static>(&mut self, definition: Tool, handler: H) {
        self.register_tool_arc(definition, Arc::new(handler));
    }

    pub fn register_tool_arc(&mut self, definition: Tool, handler: Arc<dyn ToolHandler>) {
        let name = definition.name.clone();
        debug!("Registering tool: {}", name);
        if self
            .tools
            .insert(name.clone(), RegisteredTool { definition, handler })
            .is_some()
        {
            warn!("Tool '{}' registered twice; the later registration wins", name);
        }
    }

    /// Register a tool backed by a plain closure
    pub fn register_tool_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let definition = Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        };
        self.register_tool(definition, FnHandler(handler));
    }

    pub fn register_resource<H: ResourceHandler + 'static>(
        &mut self,
        definition: Resource,
        handler: H,
    ) {
        let uri = definition.uri.clone();
        debug!("Registering resource: {}", uri);
        let entry = RegisteredResource {
            definition,
            handler: Arc::new(handler),
        };
        if self.resources.insert(uri.clone(), entry).is_some() {
            warn!("Resource '{}' registered twice; the later registration wins", uri);
        }
    }

    pub fn register_resource_fn<F>(
        &mut self,
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
        handler: F,
    ) where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        let definition = Resource {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            mime_type: mime_type.into(),
        };
        self.register_resource(definition, FnResource(handler));
    }

    pub fn register_prompt<H: PromptHandler + 'static>(&mut self, definition: Prompt, handler: H) {
        let name = definition.name.clone();
        debug!("Registering prompt: {}", name);
        let entry = RegisteredPrompt {
            definition,
            handler: Arc::new(handler),
        };
        if self.prompts.insert(name.clone(), entry).is_some() {
            warn!("Prompt '{}' registered twice; the later registration wins", name);
        }
    }

    pub fn register_prompt_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<PromptArgument>,
        handler: F,
    ) where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let definition = Prompt {
            name: name.into(),
            description: description.into(),
            arguments,
        };
        self.register_prompt(definition, FnHandler(handler));
    }

    pub fn tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn resource(&self, uri: &str) -> Option<&RegisteredResource> {
        self.resources.get(uri)
    }

    pub fn prompt(&self, name: &str) -> Option<&RegisteredPrompt> {
        self.prompts.get(name)
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources.values().map(|r| r.definition.clone()).collect()
    }

    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts.values().map(|p| p.definition.clone()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }

    /// Capabilities advertised by `initialize`
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            resources: (!self.resources.is_empty()).then(ResourcesCapability::default),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
        }
    }
}
