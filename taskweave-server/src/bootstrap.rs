//! Server assembly
//!
//! Turns a loaded task configuration into a ready [`McpServer`]: one tool per
//! configured task and workflow plus the built-in introspection capabilities.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use taskweave_core::config::DynamicConfig;
use taskweave_core::workflow::resolve;
use taskweave_mcp::protocol::PromptArgument;
use taskweave_mcp::{CapabilityRegistry, DynamicToolGenerator, McpServer};

use crate::config::Settings;
use crate::Result;

pub const SERVER_INFO_TOOL: &str = "get_server_info";
pub const SERVER_CONFIG_URI: &str = "config://server";
pub const WORKFLOW_GUIDE_PROMPT: &str = "workflow-guide";

/// Load the task configuration at `path` and build the server from it
pub fn load_server(path: &Path, settings: &Settings) -> Result<McpServer> {
    let config = DynamicConfig::from_file(path).map_err(|e| {
        error!("Failed to load task configuration: {}", e);
        e
    })?;
    build_server(config, settings)
}

pub fn build_server(config: DynamicConfig, settings: &Settings) -> Result<McpServer> {
    let generator = DynamicToolGenerator::new(config, settings.backend_settings());

    let mut registry = CapabilityRegistry::new();
    generator.register_all(&mut registry)?;
    register_builtins(&mut registry, Arc::new(generator.config().clone()))?;

    info!(
        "Server ready with {} tools, {} resources and {} prompts",
        registry.tool_count(),
        registry.resource_count(),
        registry.prompt_count()
    );
    Ok(McpServer::new(generator.server_info(), registry))
}

/// Register the introspection tool, the configuration resource and the workflow prompt
pub fn register_builtins(
    registry: &mut CapabilityRegistry,
    config: Arc<DynamicConfig>,
) -> Result<()> {
    let summary = config.summary();
    let summary_text = serde_json::to_string_pretty(&summary)?;

    registry.register_tool_fn(
        SERVER_INFO_TOOL,
        "Get information about this server and its loaded tasks and workflows",
        json!({"type": "object", "properties": {}}),
        move |_: Value| Ok(summary.clone()),
    );

    registry.register_resource_fn(
        SERVER_CONFIG_URI,
        "Server Configuration",
        "Server identity and the loaded tasks and workflows",
        "application/json",
        move || Ok(summary_text.clone()),
    );

    registry.register_prompt_fn(
        WORKFLOW_GUIDE_PROMPT,
        "Describe a configured workflow and the order its steps run in",
        vec![PromptArgument {
            name: "workflow".to_string(),
            description: "Name of the workflow to describe".to_string(),
            required: true,
        }],
        move |arguments: Value| workflow_guide(&config, &arguments),
    );

    Ok(())
}

fn workflow_guide(config: &DynamicConfig, arguments: &Value) -> taskweave_mcp::Result<Value> {
    let name = arguments
        .get("workflow")
        .and_then(Value::as_str)
        .ok_or_else(|| taskweave_mcp::Error::handler("Missing 'workflow' argument"))?;
    let workflow = config
        .find_workflow(name)
        .ok_or_else(|| taskweave_mcp::Error::handler(format!("Workflow not found: {}", name)))?;
    let order = resolve(&workflow.steps)?;

    let mut text = format!(
        "Workflow '{}': {}\n\nSteps in execution order:\n",
        workflow.name, workflow.description
    );
    for (position, step_name) in order.iter().enumerate() {
        let Some(step) = workflow.steps.iter().find(|s| &s.name == step_name) else {
            continue;
        };
        text.push_str(&format!("{}. {} (task: {})", position + 1, step.name, step.task));
        if !step.dependencies.is_empty() {
            text.push_str(&format!(" after {}", step.dependencies.join(", ")));
        }
        text.push('\n');
    }

    if !workflow.parameters.is_empty() {
        text.push_str("\nParameters:\n");
        for param in &workflow.parameters {
            let marker = if param.is_mandatory() { "required" } else { "optional" };
            text.push_str(&format!(
                "- {} ({}, {}): {}\n",
                param.name,
                param.param_type,
                marker,
                param.description
            ));
        }
    }

    Ok(json!([
        {"role": "user", "content": {"type": "text", "text": text}}
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use assert_matches::assert_matches;
    use taskweave_mcp::Session;

    const CONFIG: &str = r#"{
        "server_info": {"name": "guide-server", "version": "3.1.0"},
        "tasks": [
            {"name": "fetch", "description": "Fetch rows", "operation_type": "database",
             "config": {"query": "SELECT * FROM {table}"},
             "parameters": [{"name": "table"}]}
        ],
        "workflows": [
            {"name": "report", "description": "Build a report",
             "parameters": [{"name": "table", "description": "Source table"}],
             "steps": [
                {"name": "second", "task": "fetch", "dependencies": ["first"]},
                {"name": "first", "task": "fetch"}
             ]},
            {"name": "loop", "description": "Broken",
             "steps": [
                {"name": "a", "task": "fetch", "dependencies": ["b"]},
                {"name": "b", "task": "fetch", "dependencies": ["a"]}
             ]}
        ]
    }"#;

    async fn ready() -> (McpServer, Session) {
        let server = build_server(CONFIG.parse().unwrap(), &Settings::default()).unwrap();
        let mut session = Session::new();
        let init = json!({"jsonrpc": "2.0", "id": 0, "method": "initialize"});
        server.handle(&mut session, &init).await;
        (server, session)
    }

    fn request(method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params})
    }

    #[tokio::test]
    async fn test_server_info_tool_summarizes_configuration() {
        let (server, mut session) = ready().await;
        let response = server
            .handle(
                &mut session,
                &request("tools/call", json!({"name": SERVER_INFO_TOOL})),
            )
            .await;

        let text = response.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        let summary: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(summary["name"], "guide-server");
        assert_eq!(summary["task_count"], 1);
        assert_eq!(summary["workflow_count"], 2);
        assert_eq!(summary["tasks"][0], json!({"name": "fetch", "type": "database"}));
    }

    #[tokio::test]
    async fn test_configuration_resource_is_json() {
        let (server, mut session) = ready().await;
        let response = server
            .handle(
                &mut session,
                &request("resources/read", json!({"uri": SERVER_CONFIG_URI})),
            )
            .await;

        let contents = &response.result.unwrap()["contents"][0];
        assert_eq!(contents["mimeType"], "application/json");
        let summary: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
        assert_eq!(summary["version"], "3.1.0");
    }

    #[tokio::test]
    async fn test_workflow_guide_lists_steps_in_execution_order() {
        let (server, mut session) = ready().await;
        let response = server
            .handle(
                &mut session,
                &request(
                    "prompts/get",
                    json!({"name": WORKFLOW_GUIDE_PROMPT, "arguments": {"workflow": "report"}}),
                ),
            )
            .await;

        let result = response.result.unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        let first = text.find("1. first").unwrap();
        let second = text.find("2. second (task: fetch) after first").unwrap();
        assert!(first < second);
        assert!(text.contains("- table (string, required): Source table"));
        assert_eq!(result["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_workflow_guide_reports_unknown_and_cyclic_workflows() {
        let (server, mut session) = ready().await;

        let missing = server
            .handle(
                &mut session,
                &request(
                    "prompts/get",
                    json!({"name": WORKFLOW_GUIDE_PROMPT, "arguments": {"workflow": "nope"}}),
                ),
            )
            .await;
        let error = missing.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("Workflow not found: nope"));

        let cyclic = server
            .handle(
                &mut session,
                &request(
                    "prompts/get",
                    json!({"name": WORKFLOW_GUIDE_PROMPT, "arguments": {"workflow": "loop"}}),
                ),
            )
            .await;
        assert!(cyclic.error.unwrap().message.contains("Dependency cycle detected"));
    }

    #[test]
    fn test_capabilities_include_builtins() {
        let server = build_server(CONFIG.parse().unwrap(), &Settings::default()).unwrap();
        let registry = server.registry();
        assert_eq!(registry.tool_count(), 4);
        assert!(registry.resource(SERVER_CONFIG_URI).is_some());
        assert!(registry.prompt(WORKFLOW_GUIDE_PROMPT).is_some());
    }

    #[test]
    fn test_load_server_fails_on_missing_or_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings::default();

        let missing = load_server(&dir.path().join("absent.json"), &settings).map(|_| ());
        assert_matches!(missing, Err(Error::Core(taskweave_core::Error::Config { .. })));

        let malformed = dir.path().join("broken.json");
        std::fs::write(&malformed, "{\"tasks\": [").unwrap();
        assert_matches!(
            load_server(&malformed, &settings).map(|_| ()),
            Err(Error::Core(taskweave_core::Error::Config { .. }))
        );
    }

    #[test]
    fn test_load_server_reads_configuration_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, CONFIG).unwrap();

        let server = load_server(&path, &Settings::default()).unwrap();
        assert_eq!(server.server_info().name, "guide-server");
    }
}
