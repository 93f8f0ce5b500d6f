//! Shared fixtures for the taskweave-mcp integration tests

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;

use taskweave_core::config::DynamicConfig;
use taskweave_core::tasks::BackendSettings;
use taskweave_mcp::{CapabilityRegistry, DynamicToolGenerator, McpServer, Session};

/// Build a server exposing the tools generated from `raw` configuration
pub fn server_from_config(raw: &str) -> McpServer {
    let config: DynamicConfig = raw.parse().expect("test configuration parses");
    let generator = DynamicToolGenerator::new(config, BackendSettings::default());

    let mut registry = CapabilityRegistry::new();
    generator
        .register_all(&mut registry)
        .expect("tools register");
    McpServer::new(generator.server_info(), registry)
}

pub fn shared_server(raw: &str) -> Arc<McpServer> {
    Arc::new(server_from_config(raw))
}

pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub async fn initialized_session(server: &McpServer) -> Session {
    let mut session = Session::new();
    let response = server
        .handle(&mut session, &request(0, "initialize", json!({})))
        .await;
    assert!(response.error.is_none(), "initialize failed: {:?}", response);
    session
}

/// Call a tool and decode the JSON carried in its text content block
pub async fn call_tool(
    server: &McpServer,
    session: &mut Session,
    name: &str,
    arguments: Value,
) -> Value {
    let response = server
        .handle(
            session,
            &request(1, "tools/call", json!({"name": name, "arguments": arguments})),
        )
        .await;
    let result = response
        .result
        .unwrap_or_else(|| panic!("tool {} returned an error: {:?}", name, response.error));
    let text = result["content"][0]["text"]
        .as_str()
        .expect("text content block");
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
