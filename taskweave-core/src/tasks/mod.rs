//! Task backends and the registry of configured tasks
//!
//! A [`TaskBackend`] is the side-effecting implementation behind an
//! `operation_type` (`terminal`, `rest_api`, ...). A [`ConfiguredTask`] binds
//! one [`TaskConfig`] to the backend registry, applies parameter defaults and
//! checks required parameters before delegating. The [`TaskRegistry`] is what
//! workflows resolve step targets against.
//!
//! Every task result is a JSON object carrying a `success` flag; failures are
//! reported as `{"success": false, "error": "..."}` rather than as `Err`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TaskConfig;

pub mod data_processing;
pub mod database;
pub mod file_operation;
pub mod rest_api;
pub mod terminal;

pub use data_processing::DataProcessingBackend;
pub use database::DatabaseBackend;
pub use file_operation::FileOperationBackend;
pub use rest_api::RestApiBackend;
pub use terminal::TerminalBackend;

/// Side-effecting implementation of one operation type
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// The `operation_type` tag this backend serves
    fn operation_type(&self) -> &'static str;

    /// Execute with the task's backend configuration and the prepared parameters
    async fn execute(&self, config: &Value, params: &Value) -> Value;
}

/// Anything a workflow step can call by name
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, params: Value) -> Value;
}

/// Build a failure payload
pub fn error_payload<S: AsRef<str>>(message: S) -> Value {
    json!({
        "success": false,
        "error": message.as_ref(),
    })
}

/// Whether a result carries an explicit `success: false` marker
pub fn is_failure(result: &Value) -> bool {
    matches!(result.get("success"), Some(Value::Bool(false)))
}

/// Timeouts applied by the built-in backends
#[derive(Debug, Clone, Copy)]
pub struct BackendSettings {
    pub http_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Backends keyed by operation type
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn TaskBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend
    pub fn with_defaults(settings: BackendSettings) -> Self {
        let mut registry = Self::new();
        registry.register(TerminalBackend::new(settings.command_timeout));
        registry.register(RestApiBackend::new(settings.http_timeout));
        registry.register(FileOperationBackend);
        registry.register(DataProcessingBackend);
        registry.register(DatabaseBackend);
        registry
    }

    pub fn register<B: TaskBackend + 'static>(&mut self, backend: B) {
        let operation_type = backend.operation_type().to_string();
        debug!("Registering task backend: {}", operation_type);
        self.backends.insert(operation_type, Arc::new(backend));
    }

    pub fn get(&self, operation_type: &str) -> Option<Arc<dyn TaskBackend>> {
        self.backends.get(operation_type).cloned()
    }

    pub fn operation_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.backends.keys().cloned().collect();
        types.sort();
        types
    }
}

/// A [`TaskConfig`] bound to the backends that can execute it
pub struct ConfiguredTask {
    config: TaskConfig,
    backends: Arc<BackendRegistry>,
}

impl ConfiguredTask {
    pub fn new(config: TaskConfig, backends: Arc<BackendRegistry>) -> Self {
        Self { config, backends }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Fill declared defaults and reject calls missing a mandatory parameter
    pub fn prepare_params(&self, arguments: &Value) -> std::result::Result<Value, String> {
        let mut params: Map<String, Value> = arguments.as_object().cloned().unwrap_or_default();

        for param in &self.config.parameters {
            if params.contains_key(&param.name) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    params.insert(param.name.clone(), default.clone());
                }
                None if param.required => {
                    return Err(format!("Missing required parameter: {}", param.name));
                }
                None => {}
            }
        }

        Ok(Value::Object(params))
    }
}

#[async_trait]
impl TaskRunner for ConfiguredTask {
    async fn run(&self, arguments: Value) -> Value {
        info!("Executing task: {}", self.config.name);

        let params = match self.prepare_params(&arguments) {
            Ok(params) => params,
            Err(message) => {
                warn!("Task {} rejected: {}", self.config.name, message);
                return error_payload(message);
            }
        };

        let Some(backend) = self.backends.get(&self.config.operation_type) else {
            return error_payload(format!(
                "Unknown operation type: {}",
                self.config.operation_type
            ));
        };

        backend.execute(&self.config.config, &params).await
    }
}

/// Adapter so plain closures can stand in for tasks
pub struct FnTask<F>(pub F);

#[async_trait]
impl<F> TaskRunner for FnTask<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    async fn run(&self, params: Value) -> Value {
        (self.0)(params)
    }
}

/// Tasks callable by name from workflows
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn TaskRunner>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every configured task against the given backends
    pub fn from_configs(configs: &[TaskConfig], backends: Arc<BackendRegistry>) -> Self {
        let mut registry = Self::new();
        for config in configs {
            registry.register(
                config.name.clone(),
                ConfiguredTask::new(config.clone(), Arc::clone(&backends)),
            );
        }
        registry
    }

    /// Later registrations under the same name replace earlier ones
    pub fn register<T: TaskRunner + 'static>(&mut self, name: impl Into<String>, task: T) {
        self.register_arc(name, Arc::new(task));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, task: Arc<dyn TaskRunner>) {
        let name = name.into();
        if self.tasks.insert(name.clone(), task).is_some() {
            warn!("Task '{}' registered twice; keeping the later definition", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskRunner>> {
        self.tasks.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskParameter;

    struct EchoBackend;

    #[async_trait]
    impl TaskBackend for EchoBackend {
        fn operation_type(&self) -> &'static str {
            "echo"
        }

        async fn execute(&self, config: &Value, params: &Value) -> Value {
            json!({"success": true, "config": config, "params": params})
        }
    }

    fn param(name: &str, required: bool, default: Option<Value>) -> TaskParameter {
        TaskParameter {
            name: name.to_string(),
            param_type: "string".to_string(),
            required,
            description: String::new(),
            default,
        }
    }

    fn echo_task(parameters: Vec<TaskParameter>, operation_type: &str) -> ConfiguredTask {
        let mut backends = BackendRegistry::new();
        backends.register(EchoBackend);
        ConfiguredTask::new(
            TaskConfig {
                name: "echo_task".to_string(),
                description: String::new(),
                operation_type: operation_type.to_string(),
                config: json!({"k": "v"}),
                parameters,
            },
            Arc::new(backends),
        )
    }

    #[tokio::test]
    async fn test_defaults_fill_missing_parameters() {
        let task = echo_task(
            vec![
                param("path", true, Some(json!("."))),
                param("verbose", false, None),
            ],
            "echo",
        );

        let result = task.run(json!({})).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["params"], json!({"path": "."}));
        assert_eq!(result["config"], json!({"k": "v"}));
    }

    #[tokio::test]
    async fn test_supplied_values_win_over_defaults() {
        let task = echo_task(vec![param("path", true, Some(json!(".")))], "echo");
        let result = task.run(json!({"path": "/tmp"})).await;
        assert_eq!(result["params"]["path"], "/tmp");
    }

    #[tokio::test]
    async fn test_missing_required_parameter_fails_fast() {
        let task = echo_task(vec![param("query", true, None)], "echo");
        let result = task.run(json!({})).await;
        assert!(is_failure(&result));
        assert_eq!(result["error"], "Missing required parameter: query");
    }

    #[tokio::test]
    async fn test_unknown_operation_type() {
        let task = echo_task(vec![], "teleport");
        let result = task.run(json!({})).await;
        assert_eq!(result["error"], "Unknown operation type: teleport");
    }

    #[tokio::test]
    async fn test_registry_last_registration_wins() {
        let mut registry = TaskRegistry::new();
        registry.register("t", FnTask(|_: Value| json!({"v": 1})));
        registry.register("t", FnTask(|_: Value| json!({"v": 2})));

        assert_eq!(registry.len(), 1);
        let result = registry.get("t").unwrap().run(json!({})).await;
        assert_eq!(result["v"], 2);
    }

    #[test]
    fn test_default_backends_cover_all_operation_types() {
        let registry = BackendRegistry::with_defaults(BackendSettings::default());
        assert_eq!(
            registry.operation_types(),
            vec!["data_processing", "database", "file_operation", "rest_api", "terminal"]
        );
    }

    #[test]
    fn test_payload_helpers() {
        assert!(is_failure(&error_payload("boom")));
        assert!(!is_failure(&json!({"rows": []})));
    }
}
