//! Sequential workflow execution
//!
//! Steps run one at a time in resolved order. Each step's parameters are the
//! workflow call parameters overlaid with its `input_mapping`, where every
//! mapping value is a template over the variable namespace. After a step
//! runs, its full result is published under the step name and each
//! `output_mapping` entry present in the result under its mapped name.
//! The first result carrying `success: false` stops the run; nothing is
//! rolled back or retried.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::resolver::resolve;
use crate::config::{WorkflowConfig, WorkflowStep};
use crate::placeholder::substitute_vars;
use crate::tasks::{error_payload, is_failure, TaskRegistry};

pub struct WorkflowExecutor {
    tasks: Arc<TaskRegistry>,
}

impl WorkflowExecutor {
    pub fn new(tasks: Arc<TaskRegistry>) -> Self {
        Self { tasks }
    }

    fn step_params(
        step: &WorkflowStep,
        params: &Map<String, Value>,
        variables: &HashMap<String, Value>,
    ) -> Value {
        let mut step_params = params.clone();
        for (target, template) in &step.input_mapping {
            step_params.insert(
                target.clone(),
                Value::String(substitute_vars(template, variables)),
            );
        }
        Value::Object(step_params)
    }

    pub async fn execute(&self, workflow: &WorkflowConfig, params: Value) -> Value {
        let order = match resolve(&workflow.steps) {
            Ok(order) => order,
            Err(e) => {
                warn!("Workflow {} cannot be resolved: {}", workflow.name, e);
                return json!({
                    "success": false,
                    "workflow": workflow.name,
                    "error": e.to_string(),
                });
            }
        };

        info!(
            "Executing workflow: {} ({} steps)",
            workflow.name,
            order.len()
        );

        let params = params.as_object().cloned().unwrap_or_default();
        let steps: HashMap<&str, &WorkflowStep> = workflow
            .steps
            .iter()
            .map(|s| (s.name.as_str(), s))
            .collect();

        let mut variables: HashMap<String, Value> =
            params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut step_results = Map::new();

        for name in &order {
            let step = steps[name.as_str()];
            let step_params = Self::step_params(step, &params, &variables);

            let result = match self.tasks.get(&step.task) {
                Some(task) => {
                    debug!("Executing step: {} (task: {})", step.name, step.task);
                    task.run(step_params).await
                }
                None => error_payload(format!("Task not found: {}", step.task)),
            };

            for (result_key, published) in &step.output_mapping {
                if let Some(value) = result.get(result_key) {
                    variables.insert(published.clone(), value.clone());
                }
            }
            variables.insert(step.name.clone(), result.clone());

            let failed = is_failure(&result);
            let error = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            step_results.insert(step.name.clone(), result);

            if failed {
                warn!(
                    "Workflow {} failed at step {}: {}",
                    workflow.name, step.name, error
                );
                return json!({
                    "success": false,
                    "workflow": workflow.name,
                    "failed_step": step.name,
                    "error": error,
                    "step_results": step_results,
                });
            }
        }

        info!("Workflow {} completed", workflow.name);
        json!({
            "success": true,
            "workflow": workflow.name,
            "steps_executed": order,
            "step_results": step_results,
        })
    }
}
