//! Task and workflow configuration model
//!
//! The configuration file is read once at bootstrap and describes the server
//! identity, the tasks that become tools, and the workflows composed from
//! those tasks:
//!
//! ```json
//! {
//!   "server_info": {"name": "ops", "version": "1.0.0", "description": "Ops tasks"},
//!   "tasks": [{
//!     "name": "disk_usage",
//!     "description": "Report disk usage",
//!     "operation_type": "terminal",
//!     "config": {"command": "du -sh {path}"},
//!     "parameters": [{"name": "path", "type": "string", "default": "."}]
//!   }],
//!   "workflows": []
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::{Error, Result};

/// Identity the server reports during `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInfoConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_server_version")]
    pub version: String,
    #[serde(default = "default_server_description")]
    pub description: String,
}

fn default_server_name() -> String {
    "DynamicTaskServer".to_string()
}

fn default_server_version() -> String {
    "1.0.0".to_string()
}

fn default_server_description() -> String {
    "Dynamic MCP server".to_string()
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
            description: default_server_description(),
        }
    }
}

/// A declared input of a task or workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskParameter {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_param_type() -> String {
    "string".to_string()
}

fn default_required() -> bool {
    true
}

impl TaskParameter {
    /// JSON schema type for the declared type tag; unknown tags fall back to `string`
    pub fn schema_type(&self) -> &'static str {
        match self.param_type.as_str() {
            "integer" | "int" | "float" | "double" | "number" => "number",
            "boolean" | "bool" => "boolean",
            "object" => "object",
            "array" => "array",
            _ => "string",
        }
    }

    /// Whether a caller must supply this parameter
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

/// A configured unit of work, executed by the backend named in `operation_type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub operation_type: String,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default)]
    pub parameters: Vec<TaskParameter>,
}

fn empty_object() -> Value {
    json!({})
}

/// One step of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowStep {
    pub name: String,
    pub task: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// destination parameter -> source expression with `{variable}` tokens
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    /// task result key -> published variable name
    #[serde(default)]
    pub output_mapping: BTreeMap<String, String>,
}

/// A dependency-linked composition of tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<TaskParameter>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// The whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DynamicConfig {
    #[serde(default)]
    pub server_info: ServerInfoConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
}

impl std::str::FromStr for DynamicConfig {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("Malformed task configuration: {}", e)))
    }
}

impl DynamicConfig {
    /// Load a configuration file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to open config file {}: {}", path.display(), e))
        })?;

        let config: DynamicConfig = raw.parse()?;
        info!(
            "Loaded {} tasks and {} workflows from {}",
            config.tasks.len(),
            config.workflows.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn find_workflow(&self, name: &str) -> Option<&WorkflowConfig> {
        self.workflows.iter().find(|w| w.name == name)
    }

    /// Server info plus a listing of tasks and workflows
    pub fn summary(&self) -> Value {
        let tasks: Vec<Value> = self
            .tasks
            .iter()
            .map(|t| json!({"name": t.name, "type": t.operation_type}))
            .collect();
        let workflows: Vec<Value> = self
            .workflows
            .iter()
            .map(|w| json!({"name": w.name, "steps": w.steps.len()}))
            .collect();

        json!({
            "name": self.server_info.name,
            "version": self.server_info.version,
            "description": self.server_info.description,
            "task_count": self.tasks.len(),
            "workflow_count": self.workflows.len(),
            "tasks": tasks,
            "workflows": workflows,
        })
    }
}
