//! Dynamic capability generation from task/workflow configuration
//!
//! Every configured task becomes a tool that fills parameter defaults, checks
//! required parameters and delegates to its operation type's backend. Every
//! configured workflow becomes a tool that runs a [`WorkflowExecutor`] over
//! the same task registry.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use taskweave_core::config::{DynamicConfig, TaskConfig, TaskParameter, WorkflowConfig};
use taskweave_core::tasks::{BackendRegistry, BackendSettings, TaskRegistry, TaskRunner};
use taskweave_core::workflow::WorkflowExecutor;

use crate::protocol::{ServerInfo, Tool};
use crate::registry::{CapabilityRegistry, ToolHandler};
use crate::{Error, Result};

/// Tool handler backed by a configured task
struct TaskTool {
    runner: Arc<dyn TaskRunner>,
}

#[async_trait]
impl ToolHandler for TaskTool {
    async fn call(&self, arguments: Value) -> Result<Value> {
        Ok(self.runner.run(arguments).await)
    }
}

/// Tool handler backed by a configured workflow
struct WorkflowTool {
    workflow: WorkflowConfig,
    executor: WorkflowExecutor,
}

#[async_trait]
impl ToolHandler for WorkflowTool {
    async fn call(&self, arguments: Value) -> Result<Value> {
        info!("Executing workflow: {}", self.workflow.name);
        Ok(self.executor.execute(&self.workflow, arguments).await)
    }
}

pub struct DynamicToolGenerator {
    config: Arc<DynamicConfig>,
    tasks: Arc<TaskRegistry>,
}

impl DynamicToolGenerator {
    /// Generator using the built-in backends
    pub fn new(config: DynamicConfig, settings: BackendSettings) -> Self {
        Self::with_backends(config, Arc::new(BackendRegistry::with_defaults(settings)))
    }

    pub fn with_backends(config: DynamicConfig, backends: Arc<BackendRegistry>) -> Self {
        let tasks = TaskRegistry::from_configs(&config.tasks, backends);
        Self {
            config: Arc::new(config),
            tasks: Arc::new(tasks),
        }
    }

    pub fn config(&self) -> &DynamicConfig {
        &self.config
    }

    pub fn task_registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.tasks)
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.config.server_info.name.clone(),
            version: self.config.server_info.version.clone(),
        }
    }

    /// JSON schema for a parameter list
    ///
    /// A parameter is listed as required only when it is required and has no
    /// default.
    pub fn input_schema(parameters: &[TaskParameter]) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in parameters {
            let mut schema = json!({
                "type": param.schema_type(),
                "description": param.description,
            });
            if let Some(default) = &param.default {
                schema["default"] = default.clone();
            }
            properties.insert(param.name.clone(), schema);

            if param.is_mandatory() {
                required.push(Value::String(param.name.clone()));
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }

    fn task_tool(&self, task: &TaskConfig) -> Result<(Tool, TaskTool)> {
        let runner = self
            .tasks
            .get(&task.name)
            .ok_or_else(|| Error::Core(taskweave_core::Error::TaskNotFound(task.name.clone())))?;
        let definition = Tool {
            name: task.name.clone(),
            description: format!("{} [Operation: {}]", task.description, task.operation_type),
            input_schema: Self::input_schema(&task.parameters),
        };
        Ok((definition, TaskTool { runner }))
    }

    fn workflow_tool(&self, workflow: &WorkflowConfig) -> (Tool, WorkflowTool) {
        let definition = Tool {
            name: workflow.name.clone(),
            description: format!(
                "{} [Workflow with {} steps]",
                workflow.description,
                workflow.steps.len()
            ),
            input_schema: Self::input_schema(&workflow.parameters),
        };
        let handler = WorkflowTool {
            workflow: workflow.clone(),
            executor: WorkflowExecutor::new(self.task_registry()),
        };
        (definition, handler)
    }

    /// Register one tool per configured task and workflow
    pub fn register_all(&self, registry: &mut CapabilityRegistry) -> Result<()> {
        for task in &self.config.tasks {
            let (definition, handler) = self.task_tool(task)?;
            registry.register_tool(definition, handler);
            info!("Registered task: {} ({})", task.name, task.operation_type);
        }

        for workflow in &self.config.workflows {
            let (definition, handler) = self.workflow_tool(workflow);
            registry.register_tool(definition, handler);
            info!("Registered workflow: {}", workflow.name);
        }

        Ok(())
    }
}
