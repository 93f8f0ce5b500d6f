//! Protocol engine
//!
//! [`McpServer::handle`] takes one inbound envelope plus the caller's
//! [`Session`] and always produces exactly one response envelope. Nothing a
//! handler does (an error or a panic) escapes this boundary.

use futures_util::FutureExt;
use serde_json::{json, Value};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

use crate::protocol::{
    error_codes::*, methods, CallToolResult, GetPromptResult, InitializeResult, JsonRpcError,
    JsonRpcResponse, ReadResourceResult, ResourceContents, ServerInfo, ToolContent,
    JSONRPC_VERSION, MCP_VERSION, UNKNOWN_ID,
};
use crate::registry::CapabilityRegistry;
use crate::session::Session;
use crate::Result;

type RouteResult = std::result::Result<Value, JsonRpcError>;

fn internal_error(message: impl std::fmt::Display) -> JsonRpcError {
    JsonRpcError {
        code: INTERNAL_ERROR,
        message: format!("Internal error: {}", message),
        data: None,
    }
}

/// Envelope answering input that could not be read as JSON
pub fn parse_error(cause: impl std::fmt::Display) -> JsonRpcResponse {
    JsonRpcResponse::error(json!(UNKNOWN_ID), PARSE_ERROR, format!("Parse error: {}", cause))
}

/// Echo integer and string ids; anything else becomes `-1`
pub fn request_id(message: &Value) -> Value {
    match message.get("id") {
        Some(id @ Value::Number(n)) if n.is_i64() || n.is_u64() => id.clone(),
        Some(id @ Value::String(_)) => id.clone(),
        _ => json!(UNKNOWN_ID),
    }
}

/// Whether a transport should write the engine's response back
pub fn expects_reply(message: &Value) -> bool {
    let is_notification = message
        .get("method")
        .and_then(Value::as_str)
        .is_some_and(|m| m.starts_with(methods::NOTIFICATION_PREFIX));
    !(is_notification && message.get("id").is_none())
}

/// Run a handler future, turning both errors and panics into failure text
async fn guarded<F>(future: F) -> std::result::Result<F::Output, String>
where
    F: Future,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string())
        })
}

fn flatten<T>(outcome: std::result::Result<Result<T>, String>) -> std::result::Result<T, String> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic),
    }
}

fn required_str<'a>(params: &'a Value, field: &str) -> std::result::Result<&'a str, JsonRpcError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| internal_error(format!("Missing '{}' parameter", field)))
}

pub struct McpServer {
    server_info: ServerInfo,
    registry: CapabilityRegistry,
}

impl McpServer {
    pub fn new(server_info: ServerInfo, registry: CapabilityRegistry) -> Self {
        Self {
            server_info,
            registry,
        }
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Handle one raw line/body; malformed JSON yields a parse error envelope
    pub async fn handle_str(&self, session: &mut Session, raw: &str) -> JsonRpcResponse {
        match serde_json::from_str::<Value>(raw) {
            Ok(message) => self.handle(session, &message).await,
            Err(e) => {
                warn!("Failed to parse inbound message: {}", e);
                parse_error(e)
            }
        }
    }

    pub async fn handle(&self, session: &mut Session, message: &Value) -> JsonRpcResponse {
        let id = request_id(message);

        if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid JSON-RPC version");
        }
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_REQUEST, "Missing method");
        };

        let empty = json!({});
        let params = match message.get("params") {
            Some(Value::Null) | None => &empty,
            Some(params) => params,
        };

        debug!("Handling MCP request: {}", method);

        if method == methods::INITIALIZE {
            return match self.handle_initialize(session, params) {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(error) => Self::error_response(id, error),
            };
        }

        if !session.is_initialized() {
            warn!("Rejecting '{}' before initialize", method);
            return JsonRpcResponse::error(id, NOT_INITIALIZED, "Server not initialized");
        }

        let response = match method {
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => Ok(json!({"tools": self.registry.list_tools()})),
            methods::CALL_TOOL => self.handle_call_tool(params).await,
            methods::LIST_RESOURCES => Ok(json!({"resources": self.registry.list_resources()})),
            methods::READ_RESOURCE => self.handle_read_resource(params).await,
            methods::LIST_PROMPTS => Ok(json!({"prompts": self.registry.list_prompts()})),
            methods::GET_PROMPT => self.handle_get_prompt(params).await,
            m if m.starts_with(methods::NOTIFICATION_PREFIX) => {
                debug!("Received notification: {}", m);
                Ok(json!({}))
            }
            other => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", other),
                data: None,
            }),
        };

        match response {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => Self::error_response(id, error),
        }
    }

    fn error_response(id: Value, error: JsonRpcError) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    fn handle_initialize(&self, session: &mut Session, params: &Value) -> RouteResult {
        let client_info = params.get("clientInfo").cloned();
        let requested = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(info) = &client_info {
            let client_name = info.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let client_version = info.get("version").and_then(Value::as_str).unwrap_or("");
            info!("Client connected: {} {}", client_name, client_version);
        }
        if let Some(version) = requested.as_deref().filter(|v| *v != MCP_VERSION) {
            debug!(
                "Client requested protocol {}, answering with {}",
                version, MCP_VERSION
            );
        }

        session.initialize(client_info, requested);

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: self.registry.capabilities(),
            server_info: self.server_info.clone(),
        };
        serde_json::to_value(result).map_err(internal_error)
    }

    async fn handle_call_tool(&self, params: &Value) -> RouteResult {
        let name = required_str(params, "name")?;
        let tool = self
            .registry
            .tool(name)
            .ok_or_else(|| internal_error(format!("Tool not found: {}", name)))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        info!("Calling tool: {}", name);
        let result = flatten(guarded(tool.handler.call(arguments)).await).map_err(|e| {
            warn!("Tool {} failed: {}", name, e);
            internal_error(format!("Tool execution failed: {}", e))
        })?;

        let text = match result {
            Value::String(text) => text,
            other => other.to_string(),
        };
        serde_json::to_value(CallToolResult {
            content: vec![ToolContent::text(text)],
        })
        .map_err(internal_error)
    }

    async fn handle_read_resource(&self, params: &Value) -> RouteResult {
        let uri = required_str(params, "uri")?;
        let resource = self
            .registry
            .resource(uri)
            .ok_or_else(|| internal_error(format!("Resource not found: {}", uri)))?;

        debug!("Reading resource: {}", uri);
        let text = flatten(guarded(resource.handler.read()).await)
            .map_err(|e| internal_error(format!("Resource read failed: {}", e)))?;

        serde_json::to_value(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: resource.definition.mime_type.clone(),
                text,
            }],
        })
        .map_err(internal_error)
    }

    async fn handle_get_prompt(&self, params: &Value) -> RouteResult {
        let name = required_str(params, "name")?;
        let prompt = self
            .registry
            .prompt(name)
            .ok_or_else(|| internal_error(format!("Prompt not found: {}", name)))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        debug!("Getting prompt: {}", name);
        let messages = flatten(guarded(prompt.handler.get(arguments)).await)
            .map_err(|e| internal_error(format!("Prompt execution failed: {}", e)))?;

        serde_json::to_value(GetPromptResult {
            description: prompt.definition.description.clone(),
            messages,
        })
        .map_err(internal_error)
    }
}
